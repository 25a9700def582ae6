#![forbid(unsafe_code)]

//! Tree reconciliation: the old mounted tree vs a freshly rendered one.
//!
//! The reconciler owns the mounted tree: one mounted record per logical
//! node, keyed by [`NodeId`], plus the reverse `ViewId -> NodeId` map used by
//! the event router. A reconciliation pass walks the new tree against it and
//! appends [`NativeOp`]s to a [`Pass`]; [`Reconciler::finish_pass`] then
//! resolves child lists and returns the ordered [`BatchedUpdate`].
//!
//! # Per-node state machine
//!
//! | old | new | action |
//! |-----|-----|--------|
//! | none | some | CREATE: allocate a view id, `createView`, listeners, mount children |
//! | some | none | DELETE: unmount children first, then `deleteView` |
//! | some | some, compatible | UPDATE: swap the mapped node, patch props, diff listeners, recurse |
//! | some | some, incompatible | REPLACE: DELETE old, CREATE new under a fresh identity |
//!
//! # Invariants
//!
//! 1. A node's `ViewId` is assigned once at creation and kept until the node
//!    is unmounted. Failed creates are retried under the same id.
//! 2. On UPDATE the mounted node is replaced *before* recursing, so the event
//!    router resolves handlers against the new props from that point on.
//! 3. Listener ops carry only the symmetric difference of normalized event
//!    names; a prop-only update emits none.
//! 4. `setChildren` is emitted for a host view only when its flattened child
//!    list differs from the last list sent to it.
//! 5. Fragments, components and portals never own a view. Their children are
//!    flattened into the nearest element ancestor, or, for portals, into the
//!    element hosting the named target after the host's own children.
//!
//! # Failure Modes
//!
//! | Failure | Recovery |
//! |---------|----------|
//! | `createView` rejected | node keeps its id, marked uncreated, retried |
//! | `updateView` rejected | next sync resends the full prop set |
//! | listener op rejected | recorded listener set rolled back, rediffed next sync |
//! | `setChildren` rejected | host's sent list forgotten, resent next sync |
//! | op on a view no longer mounted | logged and skipped |
//! | view id space exhausted | element mounted without a view, logged |

use std::collections::BTreeSet;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use dcf_core::event::normalize_event_name;
use dcf_core::identity::{ChildKey, NodeId, ViewId, ViewIdAllocator};
use dcf_core::node::{ComponentNode, NodeKind, child_keys};
use dcf_render::interceptor::ExtensionRegistry;
use dcf_render::ops::{BatchedUpdate, NativeOp};
use dcf_render::prop_diff::{PropPatch, diff, wire_props};

use crate::bridge::BatchReport;
use crate::config::RuntimeConfig;
use crate::error::NodeFailure;
use crate::portal::PortalRegistry;

// ---------------------------------------------------------------------------
// Mounted state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Mounted {
    parent: Option<NodeId>,
    key: ChildKey,
    /// Shallow copy of the last node reconciled here.
    node: ComponentNode,
    depth: usize,
    children: Vec<NodeId>,
    view: Option<ViewId>,
    /// `createView` for `view` has been sent and not reported failed.
    created: bool,
    resend_props: bool,
    /// Normalized event names registered natively.
    listeners: BTreeSet<String>,
    /// Child list last sent with `setChildren`; `None` if unknown.
    sent_children: Option<Vec<ViewId>>,
    consecutive_failures: u32,
}

impl Mounted {
    fn new(parent: Option<NodeId>, key: ChildKey, node: ComponentNode, depth: usize) -> Self {
        Self {
            parent,
            key,
            node,
            depth,
            children: Vec::new(),
            view: None,
            created: false,
            resend_props: false,
            listeners: BTreeSet::new(),
            sent_children: None,
            consecutive_failures: 0,
        }
    }
}

/// A native container whose child list may need resending.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Container {
    Element(NodeId),
    Portal(String),
    Root,
}

/// Work accumulated by one reconciliation pass.
#[derive(Debug, Default)]
pub struct Pass {
    batch: BatchedUpdate,
    touched: BTreeSet<Container>,
    visited: AHashSet<NodeId>,
}

impl Pass {
    /// Operations emitted so far, in emission order.
    #[must_use]
    pub fn batch(&self) -> &BatchedUpdate {
        &self.batch
    }

    /// Whether `id` was already created, updated or re-rendered in this pass.
    #[must_use]
    pub fn visited(&self, id: NodeId) -> bool {
        self.visited.contains(&id)
    }

    fn touch(&mut self, container: Container) {
        self.touched.insert(container);
    }
}

/// Outcome of folding a [`BatchReport`] back into the mounted tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReportOutcome {
    /// Every failed operation, attributed to its node where still mounted.
    pub failures: Vec<NodeFailure>,
    /// Nodes to schedule for another attempt.
    pub retry: Vec<NodeId>,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Owner of the mounted tree and the identity maps.
#[derive(Debug)]
pub struct Reconciler {
    nodes: AHashMap<NodeId, Mounted>,
    views: AHashMap<ViewId, NodeId>,
    root: Option<NodeId>,
    root_container: Option<ViewId>,
    root_sent: Option<Vec<ViewId>>,
    portals: PortalRegistry,
    allocator: ViewIdAllocator,
    extensions: Rc<ExtensionRegistry>,
    stale: BTreeSet<Container>,
}

impl Reconciler {
    /// Reconciler with default configuration.
    #[must_use]
    pub fn new(extensions: Rc<ExtensionRegistry>) -> Self {
        Self::from_config(&RuntimeConfig::default(), extensions)
    }

    /// Reconciler honoring `config`'s root container and id range.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig, extensions: Rc<ExtensionRegistry>) -> Self {
        Self {
            nodes: AHashMap::new(),
            views: AHashMap::new(),
            root: None,
            root_container: config.root_container,
            root_sent: Some(Vec::new()),
            portals: PortalRegistry::new(),
            allocator: ViewIdAllocator::starting_at(config.view_id_start),
            extensions,
            stale: BTreeSet::new(),
        }
    }

    /// The shared extension registry.
    #[must_use]
    pub fn extensions(&self) -> &Rc<ExtensionRegistry> {
        &self.extensions
    }

    // -- lookups ------------------------------------------------------------

    /// Identity of the mounted root, if any.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Whether `id` is still mounted.
    #[must_use]
    pub fn is_live(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of mounted nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing is mounted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node currently mapped at `id` (without children).
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&ComponentNode> {
        self.nodes.get(&id).map(|m| &m.node)
    }

    /// Node bound to a native view.
    #[must_use]
    pub fn node_for_view(&self, view: ViewId) -> Option<NodeId> {
        self.views.get(&view).copied()
    }

    /// Native view bound to an element node.
    #[must_use]
    pub fn view_of(&self, id: NodeId) -> Option<ViewId> {
        self.nodes.get(&id).and_then(|m| m.view)
    }

    /// Whether `id`'s view has been created on the native side.
    #[must_use]
    pub fn is_created(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|m| m.created)
    }

    /// Logical parent.
    #[must_use]
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|m| m.parent)
    }

    /// Logical children, in order.
    #[must_use]
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map_or(&[][..], |m| m.children.as_slice())
    }

    /// Distance from the root (root is 0).
    #[must_use]
    pub fn depth_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.get(&id).map(|m| m.depth)
    }

    /// Whether `ancestor` is a strict ancestor of `id`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = self.parent_of(id);
        while let Some(cur) = cursor {
            if cur == ancestor {
                return true;
            }
            cursor = self.parent_of(cur);
        }
        false
    }

    /// First mounted component or element whose type tag is `tag`, in
    /// pre-order.
    #[must_use]
    pub fn find(&self, tag: &str) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            let m = self.nodes.get(&id)?;
            if m.node.kind().type_tag() == tag {
                return Some(id);
            }
            stack.extend(m.children.iter().rev().copied());
        }
        None
    }

    /// Every bound view id, in ascending order.
    #[must_use]
    pub fn views(&self) -> Vec<ViewId> {
        let mut views: Vec<_> = self.views.keys().copied().collect();
        views.sort_unstable();
        views
    }

    /// Portal registry.
    #[must_use]
    pub fn portals(&self) -> &PortalRegistry {
        &self.portals
    }

    /// Flattened native child list `id` would send right now.
    #[must_use]
    pub fn native_children(&self, id: NodeId) -> Vec<ViewId> {
        let mut out = Vec::new();
        let Some(m) = self.nodes.get(&id) else {
            return out;
        };
        for child in &m.children {
            self.collect_views(*child, &mut out);
        }
        if let Some(target) = m.node.hosted_portal() {
            for source in self.portals.sources(target) {
                for child in self.children_of(*source) {
                    self.collect_views(*child, &mut out);
                }
            }
        }
        out
    }

    fn collect_views(&self, id: NodeId, out: &mut Vec<ViewId>) {
        let Some(m) = self.nodes.get(&id) else {
            return;
        };
        match m.node.kind() {
            NodeKind::Element { .. } => {
                if m.created {
                    out.extend(m.view);
                }
            }
            NodeKind::Portal { .. } => {}
            NodeKind::Component { .. } | NodeKind::Fragment => {
                for child in &m.children {
                    self.collect_views(*child, out);
                }
            }
        }
    }

    /// Nearest container at or above `id`.
    fn container_of(&self, id: NodeId) -> Container {
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            let Some(m) = self.nodes.get(&cur) else {
                break;
            };
            match m.node.kind() {
                NodeKind::Element { .. } => return Container::Element(cur),
                NodeKind::Portal { target } => return Container::Portal(target.clone()),
                NodeKind::Component { .. } | NodeKind::Fragment => cursor = m.parent,
            }
        }
        Container::Root
    }

    /// Container `id`'s own view sits in.
    fn slot_of(&self, id: NodeId) -> Container {
        self.parent_of(id)
            .map_or(Container::Root, |parent| self.container_of(parent))
    }

    fn is_compatible(&self, id: NodeId, node: &ComponentNode) -> bool {
        self.nodes
            .get(&id)
            .is_some_and(|m| m.node.kind().is_compatible(node.kind()))
    }

    // -- passes -------------------------------------------------------------

    /// Start a pass. Containers whose last `setChildren` failed are revisited.
    #[must_use]
    pub fn begin_pass(&mut self) -> Pass {
        Pass {
            touched: std::mem::take(&mut self.stale),
            ..Pass::default()
        }
    }

    /// Reconcile the whole tree against `new_root`. `None` unmounts everything.
    pub fn render_root(&mut self, pass: &mut Pass, new_root: Option<&ComponentNode>) {
        pass.touch(Container::Root);
        match (self.root, new_root) {
            (Some(id), Some(node)) if self.is_compatible(id, node) => self.update(pass, id, node),
            (old, Some(node)) => {
                if let Some(old) = old {
                    self.unmount(pass, old);
                }
                let key = root_key(node);
                self.root = Some(self.mount(pass, None, key, node));
            }
            (Some(old), None) => {
                self.unmount(pass, old);
                self.root = None;
            }
            (None, None) => {}
        }
    }

    /// Re-render one mounted node in place.
    ///
    /// Components run their render function against their current props and
    /// reconcile the result. Elements resync their own view (pending create,
    /// props, listeners, child list) without touching their subtree. Returns
    /// `false` if the node is gone or was already visited in this pass.
    pub fn rerender(&mut self, pass: &mut Pass, id: NodeId) -> bool {
        if pass.visited(id) {
            return false;
        }
        let Some(m) = self.nodes.get(&id) else {
            return false;
        };
        let node = m.node.clone();
        pass.visited.insert(id);
        match node.kind() {
            NodeKind::Component { .. } => {
                if let Some(rendered) = node.render() {
                    self.reconcile_children(pass, id, std::slice::from_ref(&rendered));
                }
            }
            NodeKind::Element { .. } => {
                self.sync_element(pass, id, &node);
                pass.touch(Container::Element(id));
                let slot = self.slot_of(id);
                pass.touch(slot);
            }
            NodeKind::Fragment | NodeKind::Portal { .. } => {
                let container = self.container_of(id);
                pass.touch(container);
            }
        }
        true
    }

    /// Resolve touched containers and return the phase-ordered batch.
    #[must_use]
    pub fn finish_pass(&mut self, pass: Pass) -> BatchedUpdate {
        let Pass {
            mut batch, touched, ..
        } = pass;
        for container in touched {
            match container {
                Container::Element(id) => self.sync_children(&mut batch, id),
                Container::Portal(target) => match self.portals.host(&target) {
                    Some(host) => self.sync_children(&mut batch, host),
                    None => tracing::debug!(target = %target, "portal target has no host; content stays detached"),
                },
                Container::Root => self.sync_root(&mut batch),
            }
        }
        batch.into_ordered()
    }

    /// One-shot pass over the whole tree.
    #[must_use]
    pub fn reconcile(&mut self, new_root: Option<&ComponentNode>) -> BatchedUpdate {
        let mut pass = self.begin_pass();
        self.render_root(&mut pass, new_root);
        self.finish_pass(pass)
    }

    // -- tree walk ----------------------------------------------------------

    fn mount(
        &mut self,
        pass: &mut Pass,
        parent: Option<NodeId>,
        key: ChildKey,
        node: &ComponentNode,
    ) -> NodeId {
        let id = NodeId::next();
        let depth = parent
            .and_then(|p| self.nodes.get(&p))
            .map_or(0, |m| m.depth + 1);
        self.nodes
            .insert(id, Mounted::new(parent, key, node.shallow_clone(), depth));
        pass.visited.insert(id);

        match node.kind() {
            NodeKind::Element { portal_host, .. } => {
                match self.allocator.allocate() {
                    Some(view) => {
                        self.views.insert(view, id);
                        if let Some(m) = self.nodes.get_mut(&id) {
                            m.view = Some(view);
                        }
                        self.emit_create(pass, id);
                    }
                    None => tracing::error!(node = %id, "view id space exhausted; element stays unmounted natively"),
                }
                self.rebind_portal_host(pass, id, None, portal_host.as_deref());
                self.reconcile_children(pass, id, node.child_nodes());
            }
            NodeKind::Component { .. } => {
                if let Some(rendered) = node.render() {
                    self.reconcile_children(pass, id, std::slice::from_ref(&rendered));
                }
            }
            NodeKind::Fragment => self.reconcile_children(pass, id, node.child_nodes()),
            NodeKind::Portal { target } => {
                self.portals.add_source(target, id);
                self.reconcile_children(pass, id, node.child_nodes());
            }
        }
        id
    }

    fn update(&mut self, pass: &mut Pass, id: NodeId, new: &ComponentNode) {
        pass.visited.insert(id);
        let Some(m) = self.nodes.get_mut(&id) else {
            return;
        };
        let old = std::mem::replace(&mut m.node, new.shallow_clone());
        match new.kind() {
            NodeKind::Element { .. } => {
                self.sync_element(pass, id, &old);
                self.reconcile_children(pass, id, new.child_nodes());
            }
            NodeKind::Component { .. } => {
                if let Some(rendered) = new.render() {
                    self.reconcile_children(pass, id, std::slice::from_ref(&rendered));
                }
            }
            NodeKind::Fragment | NodeKind::Portal { .. } => {
                self.reconcile_children(pass, id, new.child_nodes());
            }
        }
    }

    fn unmount(&mut self, pass: &mut Pass, id: NodeId) {
        let Some(m) = self.nodes.remove(&id) else {
            return;
        };
        for child in &m.children {
            self.unmount(pass, *child);
        }
        match m.node.kind() {
            NodeKind::Element { portal_host, .. } => {
                if let Some(target) = portal_host {
                    self.portals.unregister_host(target, id);
                }
                if let Some(view) = m.view {
                    self.views.remove(&view);
                    if m.created {
                        pass.batch.push(NativeOp::DeleteView { view_id: view });
                    }
                }
            }
            NodeKind::Portal { target } => {
                self.portals.remove_source(target, id);
                pass.touch(Container::Portal(target.clone()));
            }
            NodeKind::Component { .. } | NodeKind::Fragment => {}
        }
        pass.touched.remove(&Container::Element(id));
        self.stale.remove(&Container::Element(id));
    }

    fn reconcile_children(&mut self, pass: &mut Pass, parent: NodeId, new_children: &[ComponentNode]) {
        let old_ids = self.children_of(parent).to_vec();
        let mut by_key: AHashMap<ChildKey, NodeId> = old_ids
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|m| (m.key.clone(), *id)))
            .collect();

        let mut next = Vec::with_capacity(new_children.len());
        for (child, (key, duplicate)) in new_children.iter().zip(child_keys(new_children)) {
            if duplicate {
                tracing::warn!(
                    parent = %parent,
                    key = child.key_str().unwrap_or_default(),
                    "duplicate sibling key; matching by position"
                );
            }
            let id = match by_key.remove(&key) {
                Some(old) if self.is_compatible(old, child) => {
                    self.update(pass, old, child);
                    old
                }
                Some(old) => {
                    self.unmount(pass, old);
                    self.mount(pass, Some(parent), key, child)
                }
                None => self.mount(pass, Some(parent), key, child),
            };
            next.push(id);
        }

        let leftover: AHashSet<NodeId> = by_key.into_values().collect();
        for id in old_ids.iter().filter(|id| leftover.contains(id)) {
            self.unmount(pass, *id);
        }

        if let Some(m) = self.nodes.get_mut(&parent) {
            m.children = next;
        }
        let container = self.container_of(parent);
        pass.touch(container);
    }

    // -- element sync -------------------------------------------------------

    fn emit_create(&mut self, pass: &mut Pass, id: NodeId) {
        let Some(m) = self.nodes.get_mut(&id) else {
            return;
        };
        let (Some(view), Some(element_type)) = (m.view, m.node.element_type()) else {
            return;
        };
        let listeners = listener_names(&m.node);
        let create = NativeOp::CreateView {
            view_id: view,
            element_type: element_type.to_owned(),
            props: wire_props(m.node.prop_map()),
        };
        m.created = true;
        m.resend_props = false;
        m.sent_children = Some(Vec::new());
        m.listeners = listeners.clone();

        pass.batch.push(create);
        if !listeners.is_empty() {
            pass.batch.push(NativeOp::AddEventListeners {
                view_id: view,
                event_names: listeners.into_iter().collect(),
            });
        }
        pass.touch(Container::Element(id));
        let slot = self.slot_of(id);
        pass.touch(slot);
    }

    /// Bring an element's view in line with its mapped node, given the node
    /// it replaced.
    fn sync_element(&mut self, pass: &mut Pass, id: NodeId, old: &ComponentNode) {
        let Some(m) = self.nodes.get(&id) else {
            return;
        };
        let new_host = m.node.hosted_portal().map(str::to_owned);
        if !m.created {
            self.emit_create(pass, id);
            self.rebind_portal_host(pass, id, old.hosted_portal(), new_host.as_deref());
            return;
        }
        let Some(view) = m.view else {
            return;
        };

        let patch = if m.resend_props {
            PropPatch::full(m.node.prop_map())
        } else {
            let raw = diff(old.prop_map(), m.node.prop_map());
            if raw.is_empty() {
                raw
            } else {
                let element_type = m.node.element_type().unwrap_or_default();
                self.extensions
                    .apply(element_type, old.prop_map(), m.node.prop_map(), raw)
            }
        };
        let wanted = listener_names(&m.node);
        let added: Vec<String> = wanted.difference(&m.listeners).cloned().collect();
        let removed: Vec<String> = m.listeners.difference(&wanted).cloned().collect();

        if let Some(m) = self.nodes.get_mut(&id) {
            m.resend_props = false;
            m.listeners = wanted;
        }
        if !patch.is_empty() {
            let (props, removed_keys) = patch.to_wire();
            pass.batch.push(NativeOp::UpdateView {
                view_id: view,
                props,
                removed: removed_keys,
            });
        }
        if !removed.is_empty() {
            pass.batch.push(NativeOp::RemoveEventListeners {
                view_id: view,
                event_names: removed,
            });
        }
        if !added.is_empty() {
            pass.batch.push(NativeOp::AddEventListeners {
                view_id: view,
                event_names: added,
            });
        }
        self.rebind_portal_host(pass, id, old.hosted_portal(), new_host.as_deref());
    }

    fn rebind_portal_host(&mut self, pass: &mut Pass, id: NodeId, old: Option<&str>, new: Option<&str>) {
        if old == new {
            return;
        }
        if let Some(target) = old {
            self.portals.unregister_host(target, id);
        }
        if let Some(target) = new {
            if let Some(previous) = self.portals.register_host(target, id) {
                tracing::warn!(target, previous = %previous, host = %id, "portal target rebound to a new host");
                pass.touch(Container::Element(previous));
            }
        }
        pass.touch(Container::Element(id));
    }

    fn sync_children(&mut self, batch: &mut BatchedUpdate, id: NodeId) {
        let Some(m) = self.nodes.get(&id) else {
            return;
        };
        let (true, Some(view)) = (m.created, m.view) else {
            return;
        };
        let list = self.native_children(id);
        let Some(m) = self.nodes.get_mut(&id) else {
            return;
        };
        if m.sent_children.as_ref() != Some(&list) {
            m.sent_children = Some(list.clone());
            batch.push(NativeOp::SetChildren {
                view_id: view,
                children: list,
            });
        }
    }

    fn sync_root(&mut self, batch: &mut BatchedUpdate) {
        let Some(container) = self.root_container else {
            return;
        };
        let mut list = Vec::new();
        if let Some(root) = self.root {
            self.collect_views(root, &mut list);
        }
        if self.root_sent.as_ref() != Some(&list) {
            self.root_sent = Some(list.clone());
            batch.push(NativeOp::SetChildren {
                view_id: container,
                children: list,
            });
        }
    }

    // -- failure handling ---------------------------------------------------

    /// Fold a bridge report back into the mounted tree.
    ///
    /// `retry_limit` is the number of consecutive failures after which a node
    /// is no longer scheduled for retry; `None` disables retries.
    pub fn apply_report(
        &mut self,
        batch: &BatchedUpdate,
        report: &BatchReport,
        retry_limit: Option<u32>,
    ) -> ReportOutcome {
        let mut outcome = ReportOutcome::default();
        let mut failed: Vec<NodeId> = Vec::new();

        for failure in &report.failures {
            let Some(op) = batch.ops().get(failure.index) else {
                tracing::warn!(index = failure.index, "bridge reported a failure outside the batch");
                continue;
            };
            let view = op.view_id();
            tracing::warn!(
                operation = %op.kind(),
                view = %view,
                error = %failure.error,
                "native operation failed"
            );
            let node = if Some(view) == self.root_container
                && matches!(op, NativeOp::SetChildren { .. })
            {
                self.invalidate(Container::Root);
                self.root
            } else {
                match self.node_for_view(view) {
                    Some(id) => {
                        self.mark_failed(id, op);
                        Some(id)
                    }
                    None => {
                        tracing::warn!(view = %view, operation = %op.kind(), "failure on a view that is no longer mounted; skipping");
                        None
                    }
                }
            };
            if let Some(id) = node {
                if !failed.contains(&id) {
                    failed.push(id);
                }
            }
            outcome.failures.push(NodeFailure {
                node,
                view,
                operation: op.kind(),
                error: failure.error.clone(),
            });
        }

        for op in batch {
            if let Some(id) = self.node_for_view(op.view_id()) {
                if !failed.contains(&id) {
                    if let Some(m) = self.nodes.get_mut(&id) {
                        m.consecutive_failures = 0;
                    }
                }
            }
        }

        for id in failed {
            let Some(m) = self.nodes.get_mut(&id) else {
                continue;
            };
            m.consecutive_failures = m.consecutive_failures.saturating_add(1);
            match retry_limit {
                Some(limit) if m.consecutive_failures <= limit => outcome.retry.push(id),
                Some(limit) => tracing::warn!(
                    node = %id,
                    attempts = m.consecutive_failures,
                    limit,
                    "retry limit reached; node stays stale until its next update"
                ),
                None => {}
            }
        }
        outcome
    }

    fn mark_failed(&mut self, id: NodeId, op: &NativeOp) {
        let slot = self.slot_of(id);
        let Some(m) = self.nodes.get_mut(&id) else {
            return;
        };
        let invalidate = match op {
            NativeOp::CreateView { .. } => {
                m.created = false;
                m.sent_children = None;
                Some(slot)
            }
            NativeOp::UpdateView { .. } => {
                m.resend_props = true;
                None
            }
            NativeOp::AddEventListeners { event_names, .. } => {
                for name in event_names {
                    m.listeners.remove(name);
                }
                None
            }
            NativeOp::RemoveEventListeners { event_names, .. } => {
                m.listeners.extend(event_names.iter().cloned());
                None
            }
            NativeOp::SetChildren { .. } => Some(Container::Element(id)),
            NativeOp::DeleteView { .. } => None,
        };
        if let Some(container) = invalidate {
            self.invalidate(container);
        }
    }

    /// Forget what was last sent to a container so the next pass resends it.
    fn invalidate(&mut self, container: Container) {
        let host = match &container {
            Container::Element(id) => Some(*id),
            Container::Portal(target) => self.portals.host(target),
            Container::Root => {
                self.root_sent = None;
                None
            }
        };
        if let Some(m) = host.and_then(|h| self.nodes.get_mut(&h)) {
            m.sent_children = None;
        }
        self.stale.insert(container);
    }

    /// Forget all mounted state, returning the ops that tear it down.
    ///
    /// Used on hot restart; the view id counter keeps running so stale ids
    /// from before the restart never alias new views.
    #[must_use]
    pub fn unmount_all(&mut self) -> BatchedUpdate {
        let batch = self.reconcile(None);
        self.portals.clear();
        self.stale.clear();
        batch
    }
}

fn root_key(node: &ComponentNode) -> ChildKey {
    match node.key_str() {
        Some(key) => ChildKey::Keyed(key.to_owned()),
        None => ChildKey::Positional {
            type_tag: node.kind().type_tag(),
            index: 0,
        },
    }
}

/// Normalized native event names for a node's handler props.
fn listener_names(node: &ComponentNode) -> BTreeSet<String> {
    node.event_types()
        .iter()
        .map(|key| normalize_event_name(key))
        .collect()
}
