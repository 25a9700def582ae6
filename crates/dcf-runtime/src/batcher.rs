#![forbid(unsafe_code)]

//! Update batching: many `schedule_update` calls, one bridge call per tick.
//!
//! [`UpdateScheduler`] is the cheap, cloneable handle components and event
//! handlers use to mark nodes dirty. [`UpdateBatcher::flush_with`] drains the
//! dirty set, walks the minimal set of subtrees, and hands the merged batch to
//! the bridge exactly once.
//!
//! # Invariants
//!
//! 1. At most one [`NativeBridge::apply_batch`] call per flush, and none for
//!    an empty batch.
//! 2. The dirty set is taken before the walk starts. Updates scheduled while
//!    a flush runs (from render functions, for example) land in the next tick.
//! 3. A dirty node below a dirty component is covered by that component's
//!    re-render and not walked separately. Dirty elements only resync
//!    themselves, so their dirty descendants are still walked.
//! 4. A dirty node that is no longer mounted is dropped without error.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | bridge rejects ops | failures returned in [`FlushOutcome`], nodes rescheduled within the retry limit |
//! | transport failure | whole batch reported failed, same recovery |

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashSet;
use dcf_core::identity::NodeId;
use dcf_core::node::NodeKind;
use dcf_render::ops::{BatchedUpdate, OpKind};

use crate::bridge::NativeBridge;
use crate::config::RuntimeConfig;
use crate::error::NodeFailure;
use crate::reconciler::{Pass, Reconciler};

// ---------------------------------------------------------------------------
// UpdateScheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DirtyQueue {
    order: Vec<NodeId>,
    members: AHashSet<NodeId>,
}

/// Handle for marking nodes dirty.
///
/// Clones share one dirty set. Scheduling never reconciles; it only records.
#[derive(Debug, Clone, Default)]
pub struct UpdateScheduler {
    queue: Rc<RefCell<DirtyQueue>>,
}

impl UpdateScheduler {
    /// Fresh, empty dirty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` dirty for the next flush. Repeated calls coalesce.
    pub fn schedule_update(&self, id: NodeId) {
        let mut queue = self.queue.borrow_mut();
        if queue.members.insert(id) {
            queue.order.push(id);
            tracing::trace!(node = %id, "update scheduled");
        }
    }

    /// Number of distinct dirty nodes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.borrow().order.len()
    }

    /// Whether nothing is dirty.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Drain the dirty set in scheduling order.
    pub(crate) fn take(&self) -> Vec<NodeId> {
        let mut queue = self.queue.borrow_mut();
        queue.members.clear();
        std::mem::take(&mut queue.order)
    }

    /// Drop everything pending.
    pub(crate) fn clear(&self) {
        let _ = self.take();
    }
}

// ---------------------------------------------------------------------------
// UpdateBatcher
// ---------------------------------------------------------------------------

/// Summary of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Operations submitted to the bridge.
    pub ops: usize,
    /// Bridge calls made (0 or 1).
    pub bridge_calls: u32,
    /// Subtrees walked for dirty nodes.
    pub walked: usize,
    /// Dirty nodes dropped because they were unmounted.
    pub dropped: usize,
    /// Failed operations.
    pub failures: Vec<NodeFailure>,
    /// Nodes rescheduled for retry.
    pub retried: usize,
}

impl FlushOutcome {
    /// Whether every submitted operation applied.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives flushes: dirty set in, one bridge call out.
#[derive(Debug, Clone)]
pub struct UpdateBatcher {
    scheduler: UpdateScheduler,
    retry_limit: Option<u32>,
}

impl UpdateBatcher {
    /// Batcher draining `scheduler`, retrying per `config`.
    #[must_use]
    pub fn new(scheduler: UpdateScheduler, config: &RuntimeConfig) -> Self {
        Self {
            scheduler,
            retry_limit: config
                .retry_failed_nodes
                .then_some(config.max_retry_attempts),
        }
    }

    /// Shared scheduler handle.
    #[must_use]
    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    /// Flush dirty nodes only.
    pub fn flush<B: NativeBridge + ?Sized>(
        &self,
        reconciler: &mut Reconciler,
        bridge: &mut B,
    ) -> FlushOutcome {
        self.flush_with(reconciler, bridge, |_, _| {})
    }

    /// Flush dirty nodes plus whatever `seed` adds to the pass first.
    ///
    /// `seed` runs before dirty nodes are walked, so nodes it already visited
    /// are not walked twice.
    pub fn flush_with<B, F>(&self, reconciler: &mut Reconciler, bridge: &mut B, seed: F) -> FlushOutcome
    where
        B: NativeBridge + ?Sized,
        F: FnOnce(&mut Reconciler, &mut Pass),
    {
        let span = tracing::debug_span!("reconcile");
        let _guard = span.enter();

        let dirty = self.scheduler.take();
        let mut pass = reconciler.begin_pass();
        seed(reconciler, &mut pass);

        let (live, dead): (Vec<_>, Vec<_>) =
            dirty.into_iter().partition(|id| reconciler.is_live(*id));
        for id in &dead {
            tracing::debug!(node = %id, "dropping update for unmounted node");
        }
        let roots = walk_roots(reconciler, &live);
        let mut outcome = FlushOutcome {
            dropped: dead.len(),
            ..FlushOutcome::default()
        };
        for id in roots {
            if reconciler.rerender(&mut pass, id) {
                outcome.walked += 1;
            }
        }

        let batch = reconciler.finish_pass(pass);
        if batch.is_empty() {
            tracing::debug!(walked = outcome.walked, "flush produced no operations");
            return outcome;
        }
        let submitted = self.submit(reconciler, bridge, &batch);
        FlushOutcome {
            walked: outcome.walked,
            dropped: outcome.dropped,
            ..submitted
        }
    }

    /// Hand a finished batch to the bridge and fold the report back.
    ///
    /// Makes exactly one bridge call for a non-empty batch and none for an
    /// empty one.
    pub fn submit<B: NativeBridge + ?Sized>(
        &self,
        reconciler: &mut Reconciler,
        bridge: &mut B,
        batch: &BatchedUpdate,
    ) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();
        if batch.is_empty() {
            return outcome;
        }
        let report = bridge.apply_batch(batch);
        outcome.ops = batch.len();
        outcome.bridge_calls = 1;

        let folded = reconciler.apply_report(batch, &report, self.retry_limit);
        outcome.retried = folded.retry.len();
        for id in folded.retry {
            self.scheduler.schedule_update(id);
        }
        outcome.failures = folded.failures;

        tracing::debug!(
            ops = outcome.ops,
            creates = batch.count(OpKind::CreateView),
            updates = batch.count(OpKind::UpdateView),
            deletes = batch.count(OpKind::DeleteView),
            failures = outcome.failures.len(),
            "batch submitted"
        );
        outcome
    }
}

/// Dirty nodes with no dirty component ancestor, shallowest first.
fn walk_roots(reconciler: &Reconciler, dirty: &[NodeId]) -> Vec<NodeId> {
    let components: AHashSet<NodeId> = dirty
        .iter()
        .copied()
        .filter(|id| {
            reconciler
                .node(*id)
                .is_some_and(|n| matches!(n.kind(), NodeKind::Component { .. }))
        })
        .collect();
    let mut roots: Vec<NodeId> = dirty
        .iter()
        .copied()
        .filter(|id| {
            let mut cursor = reconciler.parent_of(*id);
            while let Some(cur) = cursor {
                if components.contains(&cur) {
                    return false;
                }
                cursor = reconciler.parent_of(cur);
            }
            true
        })
        .collect();
    roots.sort_by_key(|id| reconciler.depth_of(*id).unwrap_or(0));
    roots
}
