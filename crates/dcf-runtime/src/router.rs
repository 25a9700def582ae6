#![forbid(unsafe_code)]

//! Event routing: `(view, raw name, data)` to a handler invocation.
//!
//! # Lookup
//!
//! The owning node is found through the reconciler's view map, so a node
//! updated in the current tick already resolves to its new props. Handler
//! keys are tried in a fixed order, first match wins:
//!
//! 1. the normalized name (`"press"` -> `"onPress"`)
//! 2. the normalized name lower-cased (`"onpress"`)
//! 3. the raw name as reported
//! 4. the raw name lower-cased
//! 5. the lower-cased raw name, normalized
//! 6. any bound key that normalizes to the same name as the event (`"press"`
//!    receives `"onPress"`, the name its listener was registered under)
//!
//! Handlers registered before the naming rules settled used all of these
//! forms, and they all stay resolvable.
//!
//! # Invocation
//!
//! | Attempt | Arguments | Tried when |
//! |---------|-----------|------------|
//! | 1 | full data map | always |
//! | 2 | `text` string | data is exactly `{text: string}` |
//! | 2 | `width`, `height` numbers | data has numeric `width` and `height` |
//! | 2 | `value` JSON | data is exactly `{value}` |
//! | 3 | none | always, last |
//!
//! An attempt that reports [`InvokeError::ArityMismatch`] moves on to the next
//! one. A handler error or panic ends dispatch for this event; it is logged
//! and never propagated.

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};

use dcf_core::event::{NativeEvent, normalize_event_name};
use dcf_core::value::{EventData, Handler, HandlerArgs, HandlerError, InvokeError, PropValue};
use serde_json::Value as JsonValue;

use crate::reconciler::Reconciler;

/// Result of dispatching one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran successfully.
    Handled {
        /// Prop key the handler was found under.
        key: String,
        /// Argument shape that was accepted.
        shape: &'static str,
    },
    /// No mounted node owns the view.
    UnknownView,
    /// The node has no handler under any candidate key.
    NoHandler,
    /// The handler rejected every argument shape.
    NoCompatibleShape {
        /// Prop key of the handler.
        key: String,
    },
    /// The handler returned an error.
    HandlerFailed {
        /// Prop key of the handler.
        key: String,
        /// The error.
        error: HandlerError,
    },
    /// The handler panicked.
    Panicked {
        /// Prop key of the handler.
        key: String,
    },
}

impl DispatchOutcome {
    /// Whether a handler ran to completion.
    #[must_use]
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled { .. })
    }
}

/// Dispatches native events to handlers on mounted nodes.
#[derive(Debug, Default)]
pub struct EventRouter {
    handled: Cell<u64>,
    failed: Cell<u64>,
}

impl EventRouter {
    /// New router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events that reached a handler successfully.
    #[must_use]
    pub fn handled_count(&self) -> u64 {
        self.handled.get()
    }

    /// Events whose handler failed, panicked or accepted no shape.
    #[must_use]
    pub fn failed_count(&self) -> u64 {
        self.failed.get()
    }

    /// Route one event.
    pub fn dispatch(&self, reconciler: &Reconciler, event: &NativeEvent) -> DispatchOutcome {
        let span = tracing::debug_span!("dispatch_event", view = %event.view_id, event = %event.name);
        let _guard = span.enter();

        let Some(node) = reconciler
            .node_for_view(event.view_id)
            .and_then(|id| reconciler.node(id))
        else {
            tracing::warn!("event for a view that is not mounted; dropping");
            return DispatchOutcome::UnknownView;
        };

        let found = candidate_keys(&event.name)
            .into_iter()
            .find_map(|key| {
                node.prop_map()
                    .get(&key)
                    .and_then(PropValue::as_handler)
                    .map(|h| (key, h.clone()))
            })
            .or_else(|| {
                let normalized = event.normalized_name();
                node.event_types()
                    .iter()
                    .find(|key| normalize_event_name(key) == normalized)
                    .and_then(|key| {
                        node.prop_map()
                            .get(key)
                            .and_then(PropValue::as_handler)
                            .map(|h| (key.clone(), h.clone()))
                    })
            });
        let Some((key, handler)) = found else {
            tracing::debug!("no handler registered for event");
            return DispatchOutcome::NoHandler;
        };

        let outcome = invoke(key, &handler, &event.data);
        match &outcome {
            DispatchOutcome::Handled { key, shape } => {
                self.handled.set(self.handled.get() + 1);
                tracing::debug!(key = %key, shape, "event handled");
            }
            DispatchOutcome::HandlerFailed { key, error } => {
                self.failed.set(self.failed.get() + 1);
                tracing::warn!(key = %key, error = %error, "event handler failed");
            }
            DispatchOutcome::Panicked { key } => {
                self.failed.set(self.failed.get() + 1);
                tracing::warn!(key = %key, "event handler panicked");
            }
            DispatchOutcome::NoCompatibleShape { key } => {
                self.failed.set(self.failed.get() + 1);
                tracing::warn!(key = %key, "event handler accepts none of the known argument shapes");
            }
            DispatchOutcome::UnknownView | DispatchOutcome::NoHandler => {}
        }
        outcome
    }
}

/// Handler keys to try for a raw event name, in priority order, deduplicated.
#[must_use]
pub fn candidate_keys(raw: &str) -> Vec<String> {
    let normalized = normalize_event_name(raw);
    let lowered_raw = raw.to_lowercase();
    let rest = [
        normalized.to_lowercase(),
        raw.to_owned(),
        lowered_raw.clone(),
        normalize_event_name(&lowered_raw),
    ];
    let mut keys = vec![normalized];
    for key in rest {
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// Positional shape implied by well-known data key sets.
#[must_use]
pub fn inferred_shape(data: &EventData) -> Option<HandlerArgs<'_>> {
    if data.len() == 1 {
        if let Some(JsonValue::String(text)) = data.get("text") {
            return Some(HandlerArgs::Text(text));
        }
        if let Some(value) = data.get("value") {
            return Some(HandlerArgs::Value(value));
        }
    }
    let width = data.get("width").and_then(JsonValue::as_f64);
    let height = data.get("height").and_then(JsonValue::as_f64);
    match (width, height) {
        (Some(w), Some(h)) => Some(HandlerArgs::Size(w, h)),
        _ => None,
    }
}

fn invoke(key: String, handler: &Handler, data: &EventData) -> DispatchOutcome {
    let attempts = [Some(HandlerArgs::Data(data)), inferred_shape(data), Some(HandlerArgs::None)];
    for args in attempts.into_iter().flatten() {
        let shape = args.shape_name();
        match catch_unwind(AssertUnwindSafe(|| handler.call(args))) {
            Ok(Ok(())) => return DispatchOutcome::Handled { key, shape },
            Ok(Err(InvokeError::ArityMismatch)) => {
                tracing::trace!(shape, "handler rejected argument shape");
            }
            Ok(Err(InvokeError::Failed(error))) => {
                return DispatchOutcome::HandlerFailed { key, error };
            }
            Err(_) => return DispatchOutcome::Panicked { key },
        }
    }
    DispatchOutcome::NoCompatibleShape { key }
}
