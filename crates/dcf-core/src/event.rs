#![forbid(unsafe_code)]

//! Inbound native events and event-name normalization.
//!
//! Native views report events under whatever name their platform code uses:
//! `"press"`, `"onPress"`, `"onTap"`. Handlers are registered under prop keys
//! such as `"onPress"`. [`normalize_event_name`] maps both sides into one
//! canonical form and must be applied identically when listeners are
//! registered and when events are looked up.
//!
//! # Normalization rule
//!
//! 1. Strip a leading `"on"` (case-sensitive) if present.
//! 2. If nothing remains, the name is `"onEvent"`.
//! 3. Otherwise the name is `"on"` followed by the remainder with its first
//!    character upper-cased.
//!
//! The rule is idempotent: normalizing a normalized name returns it unchanged.

use serde::{Deserialize, Serialize};

use crate::identity::ViewId;
use crate::value::EventData;

/// Fallback name for events reported without a name.
pub const FALLBACK_EVENT_NAME: &str = "onEvent";

/// An event raised by a native view.
///
/// `NativeEvent` is `Send` so platform threads can hand it to the
/// reconciliation thread's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeEvent {
    /// View that raised the event.
    pub view_id: ViewId,
    /// Raw event name as reported by the platform.
    #[serde(rename = "eventType")]
    pub name: String,
    /// Event payload.
    #[serde(default)]
    pub data: EventData,
}

impl NativeEvent {
    /// Create an event with an empty payload.
    pub fn new(view_id: ViewId, name: impl Into<String>) -> Self {
        Self {
            view_id,
            name: name.into(),
            data: EventData::new(),
        }
    }

    /// Attach one payload entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Canonical name of this event.
    #[must_use]
    pub fn normalized_name(&self) -> String {
        normalize_event_name(&self.name)
    }
}

/// Normalize an event name to its canonical `onXxx` form.
#[must_use]
pub fn normalize_event_name(raw: &str) -> String {
    let rest = raw.strip_prefix("on").unwrap_or(raw);
    let mut chars = rest.chars();
    match chars.next() {
        None => FALLBACK_EVENT_NAME.to_owned(),
        Some(first) => {
            let mut out = String::with_capacity(raw.len() + 2);
            out.push_str("on");
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalizes_bare_names() {
        assert_eq!(normalize_event_name("press"), "onPress");
        assert_eq!(normalize_event_name("valueChange"), "onValueChange");
    }

    #[test]
    fn keeps_prefixed_names() {
        assert_eq!(normalize_event_name("onTap"), "onTap");
        assert_eq!(normalize_event_name("onpress"), "onPress");
    }

    #[test]
    fn empty_names_fall_back() {
        assert_eq!(normalize_event_name(""), "onEvent");
        assert_eq!(normalize_event_name("on"), "onEvent");
    }

    #[test]
    fn handles_non_ascii_first_char() {
        assert_eq!(normalize_event_name("ärger"), "onÄrger");
    }

    #[test]
    fn native_event_wire_shape() {
        let event: NativeEvent = serde_json::from_str(
            r#"{"viewId": 7, "eventType": "press", "data": {"x": 1}}"#,
        )
        .unwrap();
        assert_eq!(event.view_id, ViewId::new(7));
        assert_eq!(event.normalized_name(), "onPress");
        assert_eq!(event.data.get("x"), Some(&serde_json::json!(1)));

        let no_data: NativeEvent =
            serde_json::from_str(r#"{"viewId": 1, "eventType": ""}"#).unwrap();
        assert!(no_data.data.is_empty());
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(raw in "\\PC{0,16}") {
            let once = normalize_event_name(&raw);
            prop_assert_eq!(normalize_event_name(&once), once.clone());
            prop_assert!(once.starts_with("on"));
        }
    }
}
