#![forbid(unsafe_code)]

//! Native operations and the batched update sent across the bridge.
//!
//! A [`BatchedUpdate`] is created empty at the start of a reconciliation
//! pass, appended to during the tree walk, handed to the bridge once, and
//! then dropped.
//!
//! # Wire format
//!
//! Each operation serializes as a JSON object with an `operation`
//! discriminator:
//!
//! ```text
//! {"operation":"createView","viewId":3,"elementType":"View","props":{...}}
//! {"operation":"updateView","viewId":3,"props":{...},"removed":["color"]}
//! {"operation":"deleteView","viewId":3}
//! {"operation":"setChildren","viewId":1,"children":[2,3]}
//! {"operation":"addEventListeners","viewId":3,"eventNames":["onPress"]}
//! {"operation":"removeEventListeners","viewId":3,"eventNames":["onPress"]}
//! ```
//!
//! The batch is a JSON array of such objects. The discriminator vocabulary is
//! fixed; framing beyond that is the platform bridge's business.
//!
//! # Ordering
//!
//! [`BatchedUpdate::into_ordered`] performs a stable partition into three
//! phases: creates, then mutations (updates, listeners, child lists), then
//! deletes. Because the partition is stable:
//!
//! - operations on one view keep their relative order;
//! - parents are created before children (pre-order emission);
//! - descendants are deleted before ancestors (post-order emission);
//! - child lists are set only after every listed child exists.

use std::fmt;

use dcf_core::identity::ViewId;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// One operation on a native view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NativeOp {
    /// Create a view with its initial props.
    CreateView {
        /// New view id.
        view_id: ViewId,
        /// Native component kind.
        element_type: String,
        /// Initial (non-handler) props.
        props: JsonMap<String, JsonValue>,
    },
    /// Apply a prop patch.
    UpdateView {
        /// Target view.
        view_id: ViewId,
        /// Keys set to new values.
        props: JsonMap<String, JsonValue>,
        /// Keys reset to native defaults.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        removed: Vec<String>,
    },
    /// Destroy a view.
    DeleteView {
        /// Target view.
        view_id: ViewId,
    },
    /// Replace a view's full ordered child list.
    SetChildren {
        /// Parent view.
        view_id: ViewId,
        /// Ordered child view ids.
        children: Vec<ViewId>,
    },
    /// Start delivering these events from a view.
    AddEventListeners {
        /// Target view.
        view_id: ViewId,
        /// Normalized event names.
        event_names: Vec<String>,
    },
    /// Stop delivering these events from a view.
    RemoveEventListeners {
        /// Target view.
        view_id: ViewId,
        /// Normalized event names.
        event_names: Vec<String>,
    },
}

/// Discriminator of a [`NativeOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpKind {
    /// `createView`
    CreateView,
    /// `updateView`
    UpdateView,
    /// `deleteView`
    DeleteView,
    /// `setChildren`
    SetChildren,
    /// `addEventListeners`
    AddEventListeners,
    /// `removeEventListeners`
    RemoveEventListeners,
}

impl OpKind {
    /// Wire name of the discriminator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateView => "createView",
            Self::UpdateView => "updateView",
            Self::DeleteView => "deleteView",
            Self::SetChildren => "setChildren",
            Self::AddEventListeners => "addEventListeners",
            Self::RemoveEventListeners => "removeEventListeners",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application phase used when ordering a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OpPhase {
    /// View creation.
    Create,
    /// Props, listeners, child lists.
    Mutate,
    /// View destruction.
    Delete,
}

impl NativeOp {
    /// View this operation targets.
    #[must_use]
    pub fn view_id(&self) -> ViewId {
        match self {
            Self::CreateView { view_id, .. }
            | Self::UpdateView { view_id, .. }
            | Self::DeleteView { view_id }
            | Self::SetChildren { view_id, .. }
            | Self::AddEventListeners { view_id, .. }
            | Self::RemoveEventListeners { view_id, .. } => *view_id,
        }
    }

    /// Discriminator.
    #[must_use]
    pub fn kind(&self) -> OpKind {
        match self {
            Self::CreateView { .. } => OpKind::CreateView,
            Self::UpdateView { .. } => OpKind::UpdateView,
            Self::DeleteView { .. } => OpKind::DeleteView,
            Self::SetChildren { .. } => OpKind::SetChildren,
            Self::AddEventListeners { .. } => OpKind::AddEventListeners,
            Self::RemoveEventListeners { .. } => OpKind::RemoveEventListeners,
        }
    }

    /// Ordering phase.
    #[must_use]
    pub fn phase(&self) -> OpPhase {
        match self {
            Self::CreateView { .. } => OpPhase::Create,
            Self::DeleteView { .. } => OpPhase::Delete,
            _ => OpPhase::Mutate,
        }
    }
}

/// Ordered list of native operations produced by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchedUpdate {
    ops: Vec<NativeOp>,
}

impl BatchedUpdate {
    /// Empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one operation.
    pub fn push(&mut self, op: NativeOp) {
        tracing::trace!(operation = %op.kind(), view = %op.view_id(), "batch op");
        self.ops.push(op);
    }

    /// Append every operation of `other`, in order.
    pub fn append(&mut self, other: Self) {
        self.ops.extend(other.ops);
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Operations in submission order.
    #[must_use]
    pub fn ops(&self) -> &[NativeOp] {
        &self.ops
    }

    /// Iterate operations.
    pub fn iter(&self) -> std::slice::Iter<'_, NativeOp> {
        self.ops.iter()
    }

    /// Number of operations of one kind.
    #[must_use]
    pub fn count(&self, kind: OpKind) -> usize {
        self.ops.iter().filter(|op| op.kind() == kind).count()
    }

    /// Operations targeting one view, in order.
    pub fn for_view(&self, view: ViewId) -> impl Iterator<Item = &NativeOp> {
        self.ops.iter().filter(move |op| op.view_id() == view)
    }

    /// Stable partition into create / mutate / delete phases.
    #[must_use]
    pub fn into_ordered(mut self) -> Self {
        // sort_by_key is stable.
        self.ops.sort_by_key(NativeOp::phase);
        self
    }

    /// Serialize as the `operationsJson` payload.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; with the value model used here this only
    /// happens on allocation failure paths inside `serde_json`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse an `operationsJson` payload.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or unknown `operation` values.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl IntoIterator for BatchedUpdate {
    type Item = NativeOp;
    type IntoIter = std::vec::IntoIter<NativeOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a BatchedUpdate {
    type Item = &'a NativeOp;
    type IntoIter = std::slice::Iter<'a, NativeOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

impl FromIterator<NativeOp> for BatchedUpdate {
    fn from_iter<I: IntoIterator<Item = NativeOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(n: u32) -> ViewId {
        ViewId::new(n)
    }

    #[test]
    fn wire_shape_uses_operation_discriminator() {
        let mut batch = BatchedUpdate::new();
        batch.push(NativeOp::CreateView {
            view_id: v(1),
            element_type: "View".into(),
            props: JsonMap::new(),
        });
        batch.push(NativeOp::SetChildren {
            view_id: v(1),
            children: vec![v(2), v(3)],
        });
        batch.push(NativeOp::UpdateView {
            view_id: v(2),
            props: JsonMap::new(),
            removed: vec![],
        });
        let value: JsonValue = serde_json::from_str(&batch.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!([
                {"operation": "createView", "viewId": 1, "elementType": "View", "props": {}},
                {"operation": "setChildren", "viewId": 1, "children": [2, 3]},
                {"operation": "updateView", "viewId": 2, "props": {}},
            ])
        );
    }

    #[test]
    fn parses_listener_ops() {
        let batch = BatchedUpdate::from_json(
            r#"[{"operation":"addEventListeners","viewId":4,"eventNames":["onPress"]},
                {"operation":"deleteView","viewId":4}]"#,
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.ops()[0].kind(), OpKind::AddEventListeners);
        assert_eq!(batch.ops()[1], NativeOp::DeleteView { view_id: v(4) });
        assert!(BatchedUpdate::from_json(r#"[{"operation":"explode","viewId":1}]"#).is_err());
    }

    #[test]
    fn ordering_is_a_stable_phase_partition() {
        let batch: BatchedUpdate = vec![
            NativeOp::DeleteView { view_id: v(9) },
            NativeOp::UpdateView {
                view_id: v(1),
                props: JsonMap::new(),
                removed: vec![],
            },
            NativeOp::CreateView {
                view_id: v(2),
                element_type: "Text".into(),
                props: JsonMap::new(),
            },
            NativeOp::DeleteView { view_id: v(8) },
            NativeOp::CreateView {
                view_id: v(3),
                element_type: "Text".into(),
                props: JsonMap::new(),
            },
            NativeOp::SetChildren {
                view_id: v(1),
                children: vec![v(2), v(3)],
            },
        ]
        .into_iter()
        .collect();

        let ordered = batch.into_ordered();
        let summary: Vec<_> = ordered.iter().map(|op| (op.kind(), op.view_id())).collect();
        assert_eq!(
            summary,
            vec![
                (OpKind::CreateView, v(2)),
                (OpKind::CreateView, v(3)),
                (OpKind::UpdateView, v(1)),
                (OpKind::SetChildren, v(1)),
                (OpKind::DeleteView, v(9)),
                (OpKind::DeleteView, v(8)),
            ]
        );
    }

    #[test]
    fn counts_and_view_filter() {
        let batch: BatchedUpdate = vec![
            NativeOp::DeleteView { view_id: v(1) },
            NativeOp::DeleteView { view_id: v(2) },
            NativeOp::AddEventListeners {
                view_id: v(2),
                event_names: vec!["onTap".into()],
            },
        ]
        .into_iter()
        .collect();
        assert_eq!(batch.count(OpKind::DeleteView), 2);
        assert_eq!(batch.count(OpKind::CreateView), 0);
        assert_eq!(batch.for_view(v(2)).count(), 2);
        assert_eq!(OpKind::RemoveEventListeners.to_string(), "removeEventListeners");
    }
}
