#![forbid(unsafe_code)]

//! Reference trees, recording handlers and proptest strategies.

use std::cell::RefCell;
use std::rc::Rc;

use dcf_core::identity::ViewId;
use dcf_core::node::ComponentNode;
use dcf_core::value::{EventData, Handler, PropMap, PropValue};
use dcf_runtime::{Runtime, RuntimeConfig};
use proptest::prelude::*;

use crate::native::RecordingBridge;

/// Default configuration attached to the simulated root container.
#[must_use]
pub fn config() -> RuntimeConfig {
    RuntimeConfig::default().with_root_container(ViewId::ROOT)
}

/// Runtime over a fresh [`RecordingBridge`] with [`config`].
#[must_use]
pub fn runtime() -> Runtime<RecordingBridge> {
    runtime_with(config())
}

/// Runtime over a fresh [`RecordingBridge`] with `config`.
///
/// # Panics
///
/// If `config` fails validation.
#[must_use]
pub fn runtime_with(config: RuntimeConfig) -> Runtime<RecordingBridge> {
    match Runtime::with_config(RecordingBridge::new(), config) {
        Ok(rt) => rt,
        Err(e) => panic!("invalid test config: {e}"),
    }
}

/// `Text` element keyed `key` showing `content`.
#[must_use]
pub fn text(key: &str, content: &str) -> ComponentNode {
    ComponentNode::element("Text").key(key).prop("content", content)
}

/// `View` holding one keyed `Text` per entry of `keys`, in order.
#[must_use]
pub fn keyed_list(keys: &[&str]) -> ComponentNode {
    ComponentNode::element("View")
        .key("list")
        .children(keys.iter().map(|k| text(k, k)))
}

/// Shared log of calls received by [`CallLog::recorder`] handlers.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Rc<RefCell<Vec<(String, EventData)>>>,
}

impl CallLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler that appends `(label, data)` to this log.
    #[must_use]
    pub fn recorder(&self, label: &str) -> Handler {
        let calls = Rc::clone(&self.calls);
        let label = label.to_owned();
        Handler::new(move |data| {
            calls.borrow_mut().push((label.clone(), data.clone()));
            Ok(())
        })
    }

    /// Labels of recorded calls, in order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(l, _)| l.clone()).collect()
    }

    /// Payload of the `n`th call.
    #[must_use]
    pub fn data(&self, n: usize) -> Option<EventData> {
        self.calls.borrow().get(n).map(|(_, d)| d.clone())
    }

    /// Number of recorded calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Scalar prop values, `NaN` floats included.
pub fn scalar_value() -> impl Strategy<Value = PropValue> {
    prop_oneof![
        Just(PropValue::Null),
        any::<bool>().prop_map(PropValue::Bool),
        (-1000i64..1000).prop_map(PropValue::Int),
        prop_oneof![Just(0.5), Just(f64::NAN), -10.0f64..10.0].prop_map(PropValue::Float),
        "[a-z]{0,6}".prop_map(PropValue::Str),
    ]
}

/// Scalars plus one level of lists and maps.
pub fn prop_value() -> impl Strategy<Value = PropValue> {
    prop_oneof![
        3 => scalar_value(),
        1 => prop::collection::vec(scalar_value(), 0..4).prop_map(PropValue::List),
        1 => prop::collection::btree_map("[a-c]", scalar_value(), 0..3).prop_map(PropValue::Map),
    ]
}

/// Handler-free prop maps over a small key space, so successive draws share
/// keys.
pub fn prop_map() -> impl Strategy<Value = PropMap> {
    prop::collection::btree_map("[a-e]", prop_value(), 0..5)
}

/// A subset of `pool`, shuffled.
pub fn key_order(pool: &'static [&'static str]) -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(pool.to_vec(), 0..=pool.len()).prop_shuffle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_log_records_in_order() {
        let log = CallLog::new();
        let (a, b) = (log.recorder("a"), log.recorder("b"));
        let mut data = EventData::new();
        data.insert("x".into(), json!(1));
        assert!(b.call(dcf_core::value::HandlerArgs::Data(&data)).is_ok());
        assert!(a.call(dcf_core::value::HandlerArgs::Data(&EventData::new())).is_ok());
        assert_eq!(log.labels(), ["b", "a"]);
        assert_eq!(log.data(0), Some(data));
    }

    #[test]
    fn keyed_list_shape() {
        let list = keyed_list(&["x", "y"]);
        assert_eq!(list.child_nodes().len(), 2);
        assert_eq!(list.child_nodes()[1].key_str(), Some("y"));
    }
}
