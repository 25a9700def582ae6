#![forbid(unsafe_code)]

//! Dynamically-typed property values and event handler handles.
//!
//! Props on a [`ComponentNode`](crate::node::ComponentNode) form a closed
//! tagged-value model: primitives, strings, nested lists/maps, and callback
//! handles. Nothing outside [`PropValue`] can appear in a prop map.
//!
//! # Equality
//!
//! - Primitives and strings compare by value. Floats compare by bit pattern
//!   with no epsilon; prop changes come from explicit state transitions, not
//!   from accumulated arithmetic. A `NaN` equals an identical `NaN`, so an
//!   unchanged `NaN` prop is never reported as changed, while `0.0` and
//!   `-0.0` differ.
//! - Lists and maps compare structurally, as a whole.
//! - Handlers compare by identity of the underlying closure allocation.
//!
//! # Handlers
//!
//! A [`Handler`] wraps a closure taking [`HandlerArgs`]. Handlers declare the
//! argument shape they accept through their constructor; calling a handler
//! with a shape it does not accept yields [`InvokeError::ArityMismatch`], which
//! is what drives argument-shape fallback in the event router.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value as JsonValue;

/// Ordered prop mapping from key to value.
pub type PropMap = BTreeMap<String, PropValue>;

/// Payload delivered with a native event.
pub type EventData = serde_json::Map<String, JsonValue>;

/// A single property value.
#[derive(Clone, Debug)]
pub enum PropValue {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating-point number (bitwise equality).
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Ordered list, diffed atomically.
    List(Vec<PropValue>),
    /// Nested map, diffed atomically.
    Map(PropMap),
    /// Event handler binding.
    Handler(Handler),
}

impl PropValue {
    /// Whether this value is an event handler.
    #[inline]
    #[must_use]
    pub const fn is_handler(&self) -> bool {
        matches!(self, Self::Handler(_))
    }

    /// Whether this value is a structured (collection-valued) prop.
    #[inline]
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self, Self::List(_) | Self::Map(_))
    }

    /// Borrow the string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the handler, if any.
    #[must_use]
    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            Self::Handler(h) => Some(h),
            _ => None,
        }
    }

    /// Convert to the JSON form sent across the bridge.
    ///
    /// Handlers have no wire form; nested handlers become `null`. Non-finite
    /// floats also become `null` since JSON cannot carry them.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null | Self::Handler(_) => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Str(s) => JsonValue::String(s.clone()),
            Self::List(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Build a prop value from JSON.
    #[must_use]
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::Str(s.clone()),
            JsonValue::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            JsonValue::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Handler(a), Self::Handler(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<PropValue>> for PropValue {
    fn from(v: Vec<PropValue>) -> Self {
        Self::List(v)
    }
}

impl From<PropMap> for PropValue {
    fn from(v: PropMap) -> Self {
        Self::Map(v)
    }
}

impl From<Handler> for PropValue {
    fn from(v: Handler) -> Self {
        Self::Handler(v)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Arguments a handler can be invoked with.
///
/// The event router tries these shapes in a fixed order; see
/// `dcf_runtime::router` for the dispatch table.
#[derive(Debug, Clone, Copy)]
pub enum HandlerArgs<'a> {
    /// The full event-data mapping as a single argument.
    Data(&'a EventData),
    /// A single string (event data of exactly `{text}`).
    Text(&'a str),
    /// Two numbers (event data containing `width` and `height`).
    Size(f64, f64),
    /// A single JSON value (event data of exactly `{value}`).
    Value(&'a JsonValue),
    /// No arguments.
    None,
}

impl HandlerArgs<'_> {
    /// Short name of the argument shape, for diagnostics.
    #[must_use]
    pub const fn shape_name(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Text(_) => "text",
            Self::Size(..) => "size",
            Self::Value(_) => "value",
            Self::None => "none",
        }
    }
}

/// Failure raised by a handler body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a handler error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerError {}

/// Outcome of a single handler invocation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// The handler does not accept this argument shape.
    ArityMismatch,
    /// The handler ran and failed.
    Failed(HandlerError),
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArityMismatch => f.write_str("handler does not accept this argument shape"),
            Self::Failed(err) => write!(f, "handler failed: {err}"),
        }
    }
}

impl std::error::Error for InvokeError {}

impl From<HandlerError> for InvokeError {
    fn from(err: HandlerError) -> Self {
        Self::Failed(err)
    }
}

type HandlerFn = dyn Fn(HandlerArgs<'_>) -> Result<(), InvokeError>;

/// Shared, cheaply clonable event handler.
#[derive(Clone)]
pub struct Handler {
    f: Rc<HandlerFn>,
}

impl Handler {
    /// Handler taking the full event-data map.
    pub fn new(f: impl Fn(&EventData) -> Result<(), HandlerError> + 'static) -> Self {
        Self::raw(move |args| match args {
            HandlerArgs::Data(data) => f(data).map_err(InvokeError::from),
            _ => Err(InvokeError::ArityMismatch),
        })
    }

    /// Handler taking a single string.
    pub fn text(f: impl Fn(&str) -> Result<(), HandlerError> + 'static) -> Self {
        Self::raw(move |args| match args {
            HandlerArgs::Text(text) => f(text).map_err(InvokeError::from),
            _ => Err(InvokeError::ArityMismatch),
        })
    }

    /// Handler taking two numbers (width, height).
    pub fn size(f: impl Fn(f64, f64) -> Result<(), HandlerError> + 'static) -> Self {
        Self::raw(move |args| match args {
            HandlerArgs::Size(w, h) => f(w, h).map_err(InvokeError::from),
            _ => Err(InvokeError::ArityMismatch),
        })
    }

    /// Handler taking a single JSON value.
    pub fn value(f: impl Fn(&JsonValue) -> Result<(), HandlerError> + 'static) -> Self {
        Self::raw(move |args| match args {
            HandlerArgs::Value(value) => f(value).map_err(InvokeError::from),
            _ => Err(InvokeError::ArityMismatch),
        })
    }

    /// Handler taking no arguments.
    pub fn unit(f: impl Fn() -> Result<(), HandlerError> + 'static) -> Self {
        Self::raw(move |args| match args {
            HandlerArgs::None => f().map_err(InvokeError::from),
            _ => Err(InvokeError::ArityMismatch),
        })
    }

    /// Handler with full control over shape acceptance.
    pub fn raw(f: impl Fn(HandlerArgs<'_>) -> Result<(), InvokeError> + 'static) -> Self {
        Self { f: Rc::new(f) }
    }

    /// Invoke the handler with one argument shape.
    ///
    /// # Errors
    ///
    /// - [`InvokeError::ArityMismatch`] if the shape is not accepted.
    /// - [`InvokeError::Failed`] if the handler body fails.
    pub fn call(&self, args: HandlerArgs<'_>) -> Result<(), InvokeError> {
        (self.f)(args)
    }

    /// Whether two handles share the same closure.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.f), Rc::as_ptr(&other.f))
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("ptr", &Rc::as_ptr(&self.f).cast::<()>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn float_equality_is_exact() {
        assert_eq!(PropValue::Float(0.5), PropValue::Float(0.5));
        assert_ne!(PropValue::Float(0.1 + 0.2), PropValue::Float(0.3));
        assert_eq!(PropValue::Float(f64::NAN), PropValue::Float(f64::NAN));
        assert_ne!(PropValue::Float(0.0), PropValue::Float(-0.0));
        let nested = PropValue::List(vec![PropValue::Float(f64::NAN)]);
        assert_eq!(nested, nested.clone());
    }

    #[test]
    fn handler_equality_is_identity() {
        let a = Handler::unit(|| Ok(()));
        let b = Handler::unit(|| Ok(()));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn handler_rejects_other_shapes() {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let handler = Handler::text(move |t| {
            assert_eq!(t, "hi");
            h.set(h.get() + 1);
            Ok(())
        });
        assert_eq!(
            handler.call(HandlerArgs::None),
            Err(InvokeError::ArityMismatch)
        );
        assert_eq!(handler.call(HandlerArgs::Text("hi")), Ok(()));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn handler_failure_is_reported() {
        let handler = Handler::unit(|| Err(HandlerError::new("boom")));
        let err = handler.call(HandlerArgs::None).unwrap_err();
        assert_eq!(err, InvokeError::Failed(HandlerError::new("boom")));
        assert_eq!(err.to_string(), "handler failed: boom");
    }

    #[test]
    fn json_conversion_drops_handlers() {
        let mut map = PropMap::new();
        map.insert("n".into(), PropValue::Int(3));
        map.insert("cb".into(), Handler::unit(|| Ok(())).into());
        let json = PropValue::Map(map).to_json();
        assert_eq!(json, serde_json::json!({"n": 3, "cb": null}));
    }

    #[test]
    fn json_round_trip_for_plain_values() {
        let json = serde_json::json!({"a": [1, 2.5, "x"], "b": {"c": true}});
        let value = PropValue::from_json(&json);
        assert!(value.is_collection());
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn non_finite_float_serializes_as_null() {
        assert_eq!(PropValue::Float(f64::INFINITY).to_json(), JsonValue::Null);
    }
}
