#![forbid(unsafe_code)]

//! Minimal prop patches between two prop sets of one node.
//!
//! # Algorithm
//!
//! ```text
//! for (k, v) in new:   include k if old[k] is absent or old[k] != v
//! for k in old:        include k as Removed if new[k] is absent
//! ```
//!
//! Handler-valued props are not part of the native prop set. They are
//! registered as event listeners instead, so both sides are filtered to
//! non-handler entries before comparing. A key that switches from a plain
//! value to a handler is therefore reported as removed.
//!
//! # Invariants
//!
//! 1. **Minimal**: `diff(P, P)` is empty; changing one primitive key yields a
//!    patch containing exactly that key.
//! 2. **Atomic collections**: a list/map prop that differs anywhere is carried
//!    whole as its new value, never as an element-level edit. The native side
//!    has no stable sub-key identity to apply partial edits against.
//! 3. **Exact floats**: floats compare by bit pattern, no epsilon. An
//!    unchanged `NaN` is not a change.
//! 4. **Total**: no error conditions.

use std::collections::BTreeMap;

use dcf_core::value::{PropMap, PropValue};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// One entry of a [`PropPatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    /// Key has this new value.
    Set(PropValue),
    /// Key was removed; native side resets it to its default.
    Removed,
}

/// Changed props of one node between two renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropPatch {
    entries: BTreeMap<String, PatchValue>,
}

impl PropPatch {
    /// Empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch that sets every non-handler prop of `props`.
    #[must_use]
    pub fn full(props: &PropMap) -> Self {
        diff(&PropMap::new(), props)
    }

    /// Whether nothing changed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of changed keys.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entry for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PatchValue> {
        self.entries.get(key)
    }

    /// Whether `key` is part of the patch.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Record a new value for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: PropValue) {
        self.entries.insert(key.into(), PatchValue::Set(value));
    }

    /// Record `key` as removed.
    pub fn mark_removed(&mut self, key: impl Into<String>) {
        self.entries.insert(key.into(), PatchValue::Removed);
    }

    /// Drop `key` from the patch entirely (suppress the change).
    pub fn suppress(&mut self, key: &str) -> Option<PatchValue> {
        self.entries.remove(key)
    }

    /// Keep only entries matching `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &PatchValue) -> bool) {
        self.entries.retain(|k, v| keep(k, v));
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PatchValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Split into the wire form: set values as JSON, plus removed keys.
    #[must_use]
    pub fn to_wire(&self) -> (JsonMap<String, JsonValue>, Vec<String>) {
        let mut set = JsonMap::new();
        let mut removed = Vec::new();
        for (key, value) in &self.entries {
            match value {
                PatchValue::Set(v) => {
                    set.insert(key.clone(), v.to_json());
                }
                PatchValue::Removed => removed.push(key.clone()),
            }
        }
        (set, removed)
    }
}

/// Compute the patch turning `old` into `new`.
#[must_use]
pub fn diff(old: &PropMap, new: &PropMap) -> PropPatch {
    let mut patch = PropPatch::new();
    for (key, value) in new.iter().filter(|(_, v)| !v.is_handler()) {
        let unchanged = old
            .get(key)
            .is_some_and(|prev| !prev.is_handler() && prev == value);
        if !unchanged {
            patch.set(key.clone(), value.clone());
        }
    }
    for (key, _) in old.iter().filter(|(_, v)| !v.is_handler()) {
        let still_present = new.get(key).is_some_and(|v| !v.is_handler());
        if !still_present {
            patch.mark_removed(key.clone());
        }
    }
    patch
}

/// Non-handler props in wire (JSON) form, as sent with `createView`.
#[must_use]
pub fn wire_props(props: &PropMap) -> JsonMap<String, JsonValue> {
    props
        .iter()
        .filter(|(_, v)| !v.is_handler())
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect()
}
