#![forbid(unsafe_code)]

//! In-memory native side: a view tree plus a recording [`NativeBridge`].
//!
//! [`NativeTree`] applies operations the way a strict platform would: it
//! rejects creates of existing views, updates or deletes of unknown views and
//! child lists naming views that do not exist. Tests then assert on the
//! resulting tree instead of on operation streams alone.
//!
//! # Invariants
//!
//! 1. The root container exists from construction and is never deleted.
//! 2. [`NativeTree::verify`] passes iff every listed child exists and no view
//!    is listed under two parents.
//! 3. A rejected operation leaves the tree unchanged.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use dcf_core::identity::ViewId;
use dcf_render::ops::{BatchedUpdate, NativeOp, OpKind};
use dcf_runtime::bridge::{BatchReport, NativeBridge, OpFailure, apply_op};
use dcf_runtime::error::{BridgeError, BridgeErrorKind};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Element type reported for the root container.
pub const ROOT_ELEMENT: &str = "<root>";

// ---------------------------------------------------------------------------
// NativeTree
// ---------------------------------------------------------------------------

/// One simulated native view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeView {
    /// Component kind given at creation.
    pub element_type: String,
    /// Current props.
    pub props: JsonMap<String, JsonValue>,
    /// Ordered children.
    pub children: Vec<ViewId>,
    /// Registered event names.
    pub listeners: BTreeSet<String>,
}

/// Simulated native view hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeTree {
    root: ViewId,
    views: BTreeMap<ViewId, NativeView>,
}

impl Default for NativeTree {
    fn default() -> Self {
        Self::new(ViewId::ROOT)
    }
}

impl NativeTree {
    /// Tree holding only the root container `root`.
    #[must_use]
    pub fn new(root: ViewId) -> Self {
        let mut views = BTreeMap::new();
        views.insert(
            root,
            NativeView {
                element_type: ROOT_ELEMENT.to_owned(),
                ..NativeView::default()
            },
        );
        Self { root, views }
    }

    /// Root container id.
    #[must_use]
    pub fn root(&self) -> ViewId {
        self.root
    }

    /// Look up a view.
    #[must_use]
    pub fn view(&self, id: ViewId) -> Option<&NativeView> {
        self.views.get(&id)
    }

    /// Children of `id` (empty for unknown views).
    #[must_use]
    pub fn children(&self, id: ViewId) -> &[ViewId] {
        self.views
            .get(&id)
            .map(|v| v.children.as_slice())
            .unwrap_or_default()
    }

    /// Number of live views, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Whether only the root is left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.len() <= 1
    }

    /// Live view ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ViewId> + '_ {
        self.views.keys().copied()
    }

    /// Parent listing `id`, if any.
    #[must_use]
    pub fn parent_of(&self, id: ViewId) -> Option<ViewId> {
        self.views
            .iter()
            .find(|(_, v)| v.children.contains(&id))
            .map(|(parent, _)| *parent)
    }

    /// Apply one operation.
    ///
    /// # Errors
    ///
    /// [`BridgeErrorKind::Rejected`] for a duplicate create or a root delete,
    /// [`BridgeErrorKind::UnknownView`] for anything naming a missing view.
    pub fn apply(&mut self, op: &NativeOp) -> Result<(), BridgeError> {
        match op {
            NativeOp::CreateView {
                view_id,
                element_type,
                props,
            } => {
                if self.views.contains_key(view_id) {
                    return Err(BridgeError::rejected(format!("{view_id} already exists")));
                }
                self.views.insert(
                    *view_id,
                    NativeView {
                        element_type: element_type.clone(),
                        props: props.clone(),
                        ..NativeView::default()
                    },
                );
            }
            NativeOp::UpdateView {
                view_id,
                props,
                removed,
            } => {
                let view = self.view_mut(*view_id)?;
                for (key, value) in props {
                    view.props.insert(key.clone(), value.clone());
                }
                for key in removed {
                    view.props.remove(key);
                }
            }
            NativeOp::DeleteView { view_id } => {
                if *view_id == self.root {
                    return Err(BridgeError::rejected("the root container cannot be deleted"));
                }
                if self.views.remove(view_id).is_none() {
                    return Err(unknown(*view_id));
                }
            }
            NativeOp::SetChildren { view_id, children } => {
                if let Some(missing) = children.iter().find(|c| !self.views.contains_key(c)) {
                    return Err(unknown(*missing));
                }
                self.view_mut(*view_id)?.children = children.clone();
            }
            NativeOp::AddEventListeners {
                view_id,
                event_names,
            } => {
                let view = self.view_mut(*view_id)?;
                view.listeners.extend(event_names.iter().cloned());
            }
            NativeOp::RemoveEventListeners {
                view_id,
                event_names,
            } => {
                let view = self.view_mut(*view_id)?;
                for name in event_names {
                    view.listeners.remove(name);
                }
            }
        }
        Ok(())
    }

    fn view_mut(&mut self, id: ViewId) -> Result<&mut NativeView, BridgeError> {
        self.views.get_mut(&id).ok_or_else(|| unknown(id))
    }

    /// Check structural consistency.
    ///
    /// # Errors
    ///
    /// A description of the first dangling child or doubly-parented view.
    pub fn verify(&self) -> Result<(), String> {
        let mut parent_of: BTreeMap<ViewId, ViewId> = BTreeMap::new();
        for (id, view) in &self.views {
            for child in &view.children {
                if !self.views.contains_key(child) {
                    return Err(format!("{id} lists deleted child {child}"));
                }
                if let Some(other) = parent_of.insert(*child, *id) {
                    return Err(format!("{child} listed under both {other} and {id}"));
                }
            }
        }
        Ok(())
    }

    /// Views not reachable from the root.
    #[must_use]
    pub fn detached(&self) -> Vec<ViewId> {
        let mut reachable = BTreeSet::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if reachable.insert(id) {
                stack.extend(self.children(id).iter().copied());
            }
        }
        self.views
            .keys()
            .copied()
            .filter(|id| !reachable.contains(id))
            .collect()
    }

    /// Element types of the root's subtree in pre-order, root excluded.
    #[must_use]
    pub fn element_types(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(self.root, 0, &mut |_, id, view| {
            if id != self.root {
                out.push(view.element_type.clone());
            }
        });
        out
    }

    /// Text form of the reachable tree, one view per line.
    ///
    /// ```text
    /// view#0 <root>
    ///   view#1 View {"id":"list"}
    ///     view#4 Button {"title":"Go"} on=[press]
    /// ```
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.walk(self.root, 0, &mut |depth, id, view| {
            let _ = write!(out, "{:indent$}{id} {}", "", view.element_type, indent = depth * 2);
            if !view.props.is_empty() {
                let props = JsonValue::Object(view.props.clone());
                let _ = write!(out, " {props}");
            }
            if !view.listeners.is_empty() {
                let names: Vec<&str> = view.listeners.iter().map(String::as_str).collect();
                let _ = write!(out, " on=[{}]", names.join(","));
            }
            out.push('\n');
        });
        out
    }

    /// Content hash of [`dump`](Self::dump), for cheap tree equality checks
    /// across runs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        blake3::hash(self.dump().as_bytes()).to_hex().to_string()
    }

    fn walk(&self, id: ViewId, depth: usize, f: &mut impl FnMut(usize, ViewId, &NativeView)) {
        let Some(view) = self.views.get(&id) else {
            return;
        };
        f(depth, id, view);
        for child in &view.children {
            self.walk(*child, depth + 1, f);
        }
    }
}

fn unknown(id: ViewId) -> BridgeError {
    BridgeError::new(BridgeErrorKind::UnknownView, format!("{id} does not exist"))
}

// ---------------------------------------------------------------------------
// RecordingBridge
// ---------------------------------------------------------------------------

/// A failure injected for matching operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedFailure {
    /// Operation kind to fail.
    pub kind: OpKind,
    /// Restrict to one view; `None` matches any.
    pub view: Option<ViewId>,
    /// Error kind to report.
    pub error: BridgeErrorKind,
    /// Remaining matches before the failure is spent.
    pub remaining: u32,
}

/// [`NativeBridge`] over a [`NativeTree`] that records every batch.
#[derive(Debug, Default)]
pub struct RecordingBridge {
    tree: NativeTree,
    batches: Vec<BatchedUpdate>,
    script: Vec<ScriptedFailure>,
    transport_failures: u32,
    tunnel_replies: BTreeMap<(String, String), JsonValue>,
    tunnel_calls: Vec<(String, String, JsonValue)>,
}

impl RecordingBridge {
    /// Bridge over an empty tree rooted at [`ViewId::ROOT`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bridge whose root container is `root`.
    #[must_use]
    pub fn with_root(root: ViewId) -> Self {
        Self {
            tree: NativeTree::new(root),
            ..Self::default()
        }
    }

    /// Fail the next `times` operations of `kind` (on `view`, if given).
    pub fn fail(&mut self, kind: OpKind, view: Option<ViewId>, times: u32) {
        self.script.push(ScriptedFailure {
            kind,
            view,
            error: BridgeErrorKind::Rejected,
            remaining: times,
        });
    }

    /// Fail every operation of `kind` on `view` until [`heal`](Self::heal).
    pub fn fail_always(&mut self, kind: OpKind, view: Option<ViewId>) {
        self.fail(kind, view, u32::MAX);
    }

    /// Drop the transport for the next `times` batches.
    pub fn fail_transport(&mut self, times: u32) {
        self.transport_failures = times;
    }

    /// Clear every scripted failure.
    pub fn heal(&mut self) {
        self.script.clear();
        self.transport_failures = 0;
    }

    /// Answer `component.method` tunnel calls with `reply`.
    pub fn reply_to(&mut self, component: &str, method: &str, reply: JsonValue) {
        self.tunnel_replies
            .insert((component.to_owned(), method.to_owned()), reply);
    }

    /// The simulated native tree.
    #[must_use]
    pub fn tree(&self) -> &NativeTree {
        &self.tree
    }

    /// Every batch received, in order.
    #[must_use]
    pub fn batches(&self) -> &[BatchedUpdate] {
        &self.batches
    }

    /// Number of `apply_batch` calls.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Most recent batch.
    #[must_use]
    pub fn last_batch(&self) -> Option<&BatchedUpdate> {
        self.batches.last()
    }

    /// Operations of `kind` across every batch.
    #[must_use]
    pub fn count(&self, kind: OpKind) -> usize {
        self.batches.iter().map(|b| b.count(kind)).sum()
    }

    /// Tunnel calls received.
    #[must_use]
    pub fn tunnel_calls(&self) -> &[(String, String, JsonValue)] {
        &self.tunnel_calls
    }

    /// Forget recorded batches; the tree is kept.
    pub fn clear_log(&mut self) {
        self.batches.clear();
    }

    fn scripted(&mut self, op: &NativeOp) -> Option<BridgeError> {
        let (kind, view) = (op.kind(), op.view_id());
        let entry = self
            .script
            .iter_mut()
            .find(|s| s.kind == kind && s.remaining > 0 && s.view.is_none_or(|v| v == view))?;
        if entry.remaining != u32::MAX {
            entry.remaining -= 1;
        }
        let error = BridgeError::new(entry.error, format!("scripted {kind} failure on {view}"));
        self.script.retain(|s| s.remaining > 0);
        Some(error)
    }

    fn run(&mut self, op: NativeOp) -> Result<(), BridgeError> {
        if let Some(error) = self.scripted(&op) {
            return Err(error);
        }
        self.tree.apply(&op)
    }
}

impl NativeBridge for RecordingBridge {
    fn create_view(
        &mut self,
        view: ViewId,
        element_type: &str,
        props: &JsonMap<String, JsonValue>,
    ) -> Result<(), BridgeError> {
        self.run(NativeOp::CreateView {
            view_id: view,
            element_type: element_type.to_owned(),
            props: props.clone(),
        })
    }

    fn update_view(
        &mut self,
        view: ViewId,
        props: &JsonMap<String, JsonValue>,
        removed: &[String],
    ) -> Result<(), BridgeError> {
        self.run(NativeOp::UpdateView {
            view_id: view,
            props: props.clone(),
            removed: removed.to_vec(),
        })
    }

    fn delete_view(&mut self, view: ViewId) -> Result<(), BridgeError> {
        self.run(NativeOp::DeleteView { view_id: view })
    }

    fn set_children(&mut self, view: ViewId, children: &[ViewId]) -> Result<(), BridgeError> {
        self.run(NativeOp::SetChildren {
            view_id: view,
            children: children.to_vec(),
        })
    }

    fn add_event_listeners(
        &mut self,
        view: ViewId,
        event_names: &[String],
    ) -> Result<(), BridgeError> {
        self.run(NativeOp::AddEventListeners {
            view_id: view,
            event_names: event_names.to_vec(),
        })
    }

    fn remove_event_listeners(
        &mut self,
        view: ViewId,
        event_names: &[String],
    ) -> Result<(), BridgeError> {
        self.run(NativeOp::RemoveEventListeners {
            view_id: view,
            event_names: event_names.to_vec(),
        })
    }

    fn apply_batch(&mut self, batch: &BatchedUpdate) -> BatchReport {
        self.batches.push(batch.clone());
        if self.transport_failures > 0 {
            self.transport_failures -= 1;
            let error = BridgeError::new(BridgeErrorKind::Transport, "scripted transport failure");
            return BatchReport::all_failed(batch.len(), &error);
        }
        let mut report = BatchReport::success();
        for (index, op) in batch.iter().enumerate() {
            if let Err(error) = apply_op(self, op) {
                tracing::debug!(index, operation = %op.kind(), %error, "native op rejected");
                report.failures.push(OpFailure { index, error });
            }
        }
        report
    }

    fn tunnel(
        &mut self,
        component_type: &str,
        method: &str,
        params: &JsonValue,
    ) -> Result<JsonValue, BridgeError> {
        self.tunnel_calls
            .push((component_type.to_owned(), method.to_owned(), params.clone()));
        self.tunnel_replies
            .get(&(component_type.to_owned(), method.to_owned()))
            .cloned()
            .ok_or_else(|| BridgeError::unsupported(format!("tunnel {component_type}.{method}")))
    }
}
