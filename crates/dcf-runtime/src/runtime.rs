#![forbid(unsafe_code)]

//! The runtime: reconciler, batcher, router and bridge on one thread.
//!
//! # Threading
//!
//! A [`Runtime`] is `!Send`; it lives on the reconciliation thread together
//! with every node, handler and [`State`]. Platform threads hand native events
//! over through an [`EventSender`], which is `Send + Clone`; they are
//! dispatched in arrival order at the start of the next [`Runtime::tick`].
//!
//! # Tick
//!
//! ```text
//! tick():
//!   drain event queue -> EventRouter::dispatch (handlers may schedule updates)
//!   UpdateBatcher::flush -> at most one NativeBridge::apply_batch
//! ```
//!
//! Because the bridge call returns before the next tick starts, batches never
//! overlap.

use std::rc::Rc;
use std::sync::mpsc;
use std::time::Duration;

use dcf_core::event::NativeEvent;
use dcf_core::identity::{NodeId, ViewId};
use dcf_core::node::ComponentNode;
use dcf_core::value::EventData;
use dcf_render::interceptor::ExtensionRegistry;
use serde_json::Value as JsonValue;

use crate::backoff::{ExponentialBackoff, poll_until};
use crate::batcher::{FlushOutcome, UpdateBatcher, UpdateScheduler};
use crate::bridge::NativeBridge;
use crate::config::RuntimeConfig;
use crate::error::{BridgeError, ConfigError, EventQueueClosed, RenderError};
use crate::reconciler::Reconciler;
use crate::router::{DispatchOutcome, EventRouter};
use crate::state::{State, Subscription};

/// Thread-safe handle for delivering native events to a [`Runtime`].
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<NativeEvent>,
}

impl EventSender {
    /// Queue an event for the next tick.
    ///
    /// # Errors
    ///
    /// [`EventQueueClosed`] once the runtime has been dropped.
    pub fn send(&self, event: NativeEvent) -> Result<(), EventQueueClosed> {
        self.tx.send(event).map_err(|_| EventQueueClosed)
    }

    /// Queue an event from its parts, as delivered by `onNativeEvent`.
    ///
    /// # Errors
    ///
    /// [`EventQueueClosed`] once the runtime has been dropped.
    pub fn emit(
        &self,
        view_id: ViewId,
        name: impl Into<String>,
        data: EventData,
    ) -> Result<(), EventQueueClosed> {
        self.send(NativeEvent {
            view_id,
            name: name.into(),
            data,
        })
    }
}

/// Result of one [`Runtime::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// One entry per event drained from the queue, in arrival order.
    pub events: Vec<DispatchOutcome>,
    /// The flush that followed.
    pub flush: FlushOutcome,
}

/// Single-threaded DCFlight runtime driving one [`NativeBridge`].
#[derive(Debug)]
pub struct Runtime<B: NativeBridge> {
    bridge: B,
    config: RuntimeConfig,
    reconciler: Reconciler,
    batcher: UpdateBatcher,
    router: EventRouter,
    events_tx: mpsc::Sender<NativeEvent>,
    events_rx: mpsc::Receiver<NativeEvent>,
}

impl<B: NativeBridge> Runtime<B> {
    /// Runtime with default configuration and a fresh extension registry.
    pub fn new(bridge: B) -> Self {
        let config = RuntimeConfig::default();
        Self::assemble(bridge, config, Rc::new(ExtensionRegistry::new()))
    }

    /// Runtime with `config`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if `config` fails validation.
    pub fn with_config(bridge: B, config: RuntimeConfig) -> Result<Self, ConfigError> {
        Self::with_extensions(bridge, config, Rc::new(ExtensionRegistry::new()))
    }

    /// Runtime sharing an existing extension registry.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if `config` fails validation.
    pub fn with_extensions(
        bridge: B,
        config: RuntimeConfig,
        extensions: Rc<ExtensionRegistry>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::assemble(bridge, config, extensions))
    }

    fn assemble(bridge: B, config: RuntimeConfig, extensions: Rc<ExtensionRegistry>) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let scheduler = UpdateScheduler::new();
        Self {
            reconciler: Reconciler::from_config(&config, extensions),
            batcher: UpdateBatcher::new(scheduler, &config),
            router: EventRouter::new(),
            bridge,
            config,
            events_tx,
            events_rx,
        }
    }

    // -- accessors ----------------------------------------------------------

    /// The bridge.
    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// The bridge, mutably.
    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    /// Active configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The reconciler (read-only).
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// The event router.
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// The extension registry interceptors are registered with.
    pub fn extensions(&self) -> &Rc<ExtensionRegistry> {
        self.reconciler.extensions()
    }

    /// Handle for marking nodes dirty.
    pub fn scheduler(&self) -> UpdateScheduler {
        self.batcher.scheduler().clone()
    }

    /// Handle for delivering native events from any thread.
    pub fn event_sender(&self) -> EventSender {
        EventSender {
            tx: self.events_tx.clone(),
        }
    }

    /// Mark `node` dirty for the next tick.
    pub fn schedule_update(&self, node: NodeId) {
        self.batcher.scheduler().schedule_update(node);
    }

    /// Re-render `node` whenever `state` changes.
    #[must_use = "dropping the Subscription stops the link"]
    pub fn watch<T: Clone + PartialEq + 'static>(
        &self,
        state: &State<T>,
        node: NodeId,
    ) -> Subscription {
        let scheduler = self.scheduler();
        state.subscribe(move |_| scheduler.schedule_update(node))
    }

    /// First mounted node with type tag `tag`.
    pub fn find(&self, tag: &str) -> Option<NodeId> {
        self.reconciler.find(tag)
    }

    // -- rendering ----------------------------------------------------------

    /// Reconcile `root` against the mounted tree and flush, together with any
    /// pending dirty nodes.
    ///
    /// # Errors
    ///
    /// [`RenderError`] listing every failed native operation of this flush.
    /// Operations that succeeded stay applied; failed nodes are retried on
    /// later ticks within the configured limit.
    pub fn render(&mut self, root: &ComponentNode) -> Result<FlushOutcome, RenderError> {
        let outcome = self
            .batcher
            .flush_with(&mut self.reconciler, &mut self.bridge, |r, pass| {
                r.render_root(pass, Some(root));
            });
        into_result(outcome)
    }

    /// Dispatch one event immediately, without flushing.
    pub fn dispatch_event(&mut self, event: &NativeEvent) -> DispatchOutcome {
        self.router.dispatch(&self.reconciler, event)
    }

    /// Drain queued events, then flush dirty nodes.
    pub fn tick(&mut self) -> TickOutcome {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(self.router.dispatch(&self.reconciler, &event));
        }
        let flush = self.batcher.flush(&mut self.reconciler, &mut self.bridge);
        TickOutcome { events, flush }
    }

    /// Delete every mounted view and reset identity, portal and dirty state.
    ///
    /// # Errors
    ///
    /// [`RenderError`] if the bridge rejects any teardown operation. The
    /// local state is reset regardless.
    pub fn unmount(&mut self) -> Result<FlushOutcome, RenderError> {
        self.batcher.scheduler().clear();
        let batch = self.reconciler.unmount_all();
        let outcome = self
            .batcher
            .submit(&mut self.reconciler, &mut self.bridge, &batch);
        self.batcher.scheduler().clear();
        tracing::info!(ops = outcome.ops, "runtime unmounted");
        into_result(outcome)
    }

    /// Direct component call, outside of batching.
    ///
    /// # Errors
    ///
    /// Whatever the bridge reports; [`BridgeError`] with kind `Unsupported`
    /// for bridges without tunnel support.
    pub fn tunnel(
        &mut self,
        component_type: &str,
        method: &str,
        params: &JsonValue,
    ) -> Result<JsonValue, BridgeError> {
        self.bridge.tunnel(component_type, method, params)
    }

    /// Wait, with bounded backoff, until `node`'s view exists natively.
    ///
    /// Each unsuccessful check runs a tick, so queued events and retries make
    /// progress. Failures of those ticks are logged. `sleep` receives each delay. Returns the view id, or `None`
    /// once the backoff is exhausted.
    pub fn wait_for_view(&mut self, node: NodeId, sleep: impl FnMut(Duration)) -> Option<ViewId> {
        let backoff = ExponentialBackoff::new(&self.config.backoff);
        let ready = poll_until(backoff, sleep, || {
            if self.reconciler.is_created(node) {
                return true;
            }
            let tick = self.tick();
            for failure in &tick.flush.failures {
                tracing::warn!(node = %node, failure = %failure, "flush failed while waiting for view");
            }
            self.reconciler.is_created(node)
        });
        if !ready {
            tracing::warn!(node = %node, "view did not become available within the backoff budget");
            return None;
        }
        self.reconciler.view_of(node)
    }
}

fn into_result(outcome: FlushOutcome) -> Result<FlushOutcome, RenderError> {
    if outcome.failures.is_empty() {
        Ok(outcome)
    } else {
        Err(RenderError::new(outcome.failures))
    }
}
