#![forbid(unsafe_code)]

//! The native bridge contract.
//!
//! The reconciler never talks to platform views directly. It produces a
//! [`BatchedUpdate`] and the update batcher hands it to a [`NativeBridge`]
//! exactly once per flush via [`NativeBridge::apply_batch`].
//!
//! Platform implementations either implement the six primitive operations
//! and inherit the default `apply_batch` (which brackets them with
//! `begin_batch`/`commit_batch`), or override `apply_batch` to ship the whole
//! batch at once, as [`JsonBridge`] does.
//!
//! # Failure semantics
//!
//! - A per-operation error is recorded in the [`BatchReport`] and the rest of
//!   the batch still applies.
//! - A [`BridgeErrorKind::Transport`] error aborts the batch: `cancel_batch`
//!   is called and every operation is reported failed.
//!
//! View metadata (ids, registered event names) is kept by bridge
//! implementations in side tables keyed by [`ViewId`], never on the view
//! objects themselves.

use dcf_core::identity::ViewId;
use dcf_render::ops::{BatchedUpdate, NativeOp};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{BridgeError, BridgeErrorKind};

/// One failed operation of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpFailure {
    /// Index of the operation within the submitted batch.
    pub index: usize,
    /// Why it failed.
    pub error: BridgeError,
}

/// Result of applying one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Failed operations, in batch order.
    pub failures: Vec<OpFailure>,
}

impl BatchReport {
    /// Report with no failures.
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// Report marking every operation of a `len`-sized batch as failed.
    #[must_use]
    pub fn all_failed(len: usize, error: &BridgeError) -> Self {
        Self {
            failures: (0..len)
                .map(|index| OpFailure {
                    index,
                    error: error.clone(),
                })
                .collect(),
        }
    }

    /// Whether every operation applied.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Platform-side view operations driven by the reconciler.
pub trait NativeBridge {
    /// Create a view.
    ///
    /// # Errors
    ///
    /// Returns a [`BridgeError`] if the native side refuses.
    fn create_view(
        &mut self,
        view: ViewId,
        element_type: &str,
        props: &JsonMap<String, JsonValue>,
    ) -> Result<(), BridgeError>;

    /// Apply a prop patch.
    ///
    /// # Errors
    ///
    /// Returns a [`BridgeError`] if the native side refuses.
    fn update_view(
        &mut self,
        view: ViewId,
        props: &JsonMap<String, JsonValue>,
        removed: &[String],
    ) -> Result<(), BridgeError>;

    /// Destroy a view.
    ///
    /// # Errors
    ///
    /// Returns a [`BridgeError`] if the native side refuses.
    fn delete_view(&mut self, view: ViewId) -> Result<(), BridgeError>;

    /// Replace a view's ordered child list.
    ///
    /// # Errors
    ///
    /// Returns a [`BridgeError`] if the native side refuses.
    fn set_children(&mut self, view: ViewId, children: &[ViewId]) -> Result<(), BridgeError>;

    /// Register event listeners.
    ///
    /// # Errors
    ///
    /// Returns a [`BridgeError`] if the native side refuses.
    fn add_event_listeners(&mut self, view: ViewId, event_names: &[String])
    -> Result<(), BridgeError>;

    /// Unregister event listeners.
    ///
    /// # Errors
    ///
    /// Returns a [`BridgeError`] if the native side refuses.
    fn remove_event_listeners(
        &mut self,
        view: ViewId,
        event_names: &[String],
    ) -> Result<(), BridgeError>;

    /// Open a batch. Default: no-op.
    ///
    /// # Errors
    ///
    /// An error aborts the batch before any operation runs.
    fn begin_batch(&mut self) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Commit a batch. Default: no-op.
    ///
    /// # Errors
    ///
    /// An error marks the whole batch failed.
    fn commit_batch(&mut self) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Discard an open batch. Default: no-op.
    fn cancel_batch(&mut self) {}

    /// Apply a whole batch. This is the single call made per flush.
    fn apply_batch(&mut self, batch: &BatchedUpdate) -> BatchReport {
        if let Err(err) = self.begin_batch() {
            return BatchReport::all_failed(batch.len(), &err);
        }
        let mut report = BatchReport::default();
        for (index, op) in batch.iter().enumerate() {
            if let Err(error) = apply_op(self, op) {
                if error.kind() == BridgeErrorKind::Transport {
                    self.cancel_batch();
                    return BatchReport::all_failed(batch.len(), &error);
                }
                report.failures.push(OpFailure { index, error });
            }
        }
        if let Err(err) = self.commit_batch() {
            self.cancel_batch();
            return BatchReport::all_failed(batch.len(), &err);
        }
        report
    }

    /// Direct, un-batched call into a native component.
    ///
    /// # Errors
    ///
    /// Default: [`BridgeErrorKind::Unsupported`].
    fn tunnel(
        &mut self,
        component_type: &str,
        method: &str,
        params: &JsonValue,
    ) -> Result<JsonValue, BridgeError> {
        let _ = params;
        Err(BridgeError::unsupported(format!(
            "tunnel {component_type}.{method}"
        )))
    }
}

/// Dispatch one operation to the matching primitive.
///
/// # Errors
///
/// Propagates the primitive's error.
pub fn apply_op<B: NativeBridge + ?Sized>(bridge: &mut B, op: &NativeOp) -> Result<(), BridgeError> {
    match op {
        NativeOp::CreateView {
            view_id,
            element_type,
            props,
        } => bridge.create_view(*view_id, element_type, props),
        NativeOp::UpdateView {
            view_id,
            props,
            removed,
        } => bridge.update_view(*view_id, props, removed),
        NativeOp::DeleteView { view_id } => bridge.delete_view(*view_id),
        NativeOp::SetChildren { view_id, children } => bridge.set_children(*view_id, children),
        NativeOp::AddEventListeners {
            view_id,
            event_names,
        } => bridge.add_event_listeners(*view_id, event_names),
        NativeOp::RemoveEventListeners {
            view_id,
            event_names,
        } => bridge.remove_event_listeners(*view_id, event_names),
    }
}

// ---------------------------------------------------------------------------
// JsonBridge
// ---------------------------------------------------------------------------

/// A transport that accepts whole batches as `operationsJson` strings.
///
/// This is the shape of C-ABI bridges (`commit_batch_update(const char*)`).
pub trait JsonTransport {
    /// Deliver one serialized batch.
    ///
    /// # Errors
    ///
    /// Any error marks the whole batch failed.
    fn commit(&mut self, operations_json: &str) -> Result<(), BridgeError>;

    /// Direct component call with JSON params.
    ///
    /// # Errors
    ///
    /// Default: [`BridgeErrorKind::Unsupported`].
    fn tunnel(
        &mut self,
        component_type: &str,
        method: &str,
        params_json: &str,
    ) -> Result<String, BridgeError> {
        let _ = params_json;
        Err(BridgeError::unsupported(format!(
            "tunnel {component_type}.{method}"
        )))
    }
}

/// [`NativeBridge`] adapter shipping batches through a [`JsonTransport`].
#[derive(Debug)]
pub struct JsonBridge<T> {
    transport: T,
}

impl<T: JsonTransport> JsonBridge<T> {
    /// Wrap a transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Unwrap the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn single(&mut self, op: NativeOp) -> Result<(), BridgeError> {
        let batch: BatchedUpdate = std::iter::once(op).collect();
        let json = batch
            .to_json()
            .map_err(|e| BridgeError::new(BridgeErrorKind::Transport, e.to_string()))?;
        self.transport.commit(&json)
    }
}

impl<T: JsonTransport> NativeBridge for JsonBridge<T> {
    fn create_view(
        &mut self,
        view: ViewId,
        element_type: &str,
        props: &JsonMap<String, JsonValue>,
    ) -> Result<(), BridgeError> {
        self.single(NativeOp::CreateView {
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
        self.single(NativeOp::UpdateView {
            view_id: view,
            props: props.clone(),
            removed: removed.to_vec(),
        })
    }

    fn delete_view(&mut self, view: ViewId) -> Result<(), BridgeError> {
        self.single(NativeOp::DeleteView { view_id: view })
    }

    fn set_children(&mut self, view: ViewId, children: &[ViewId]) -> Result<(), BridgeError> {
        self.single(NativeOp::SetChildren {
            view_id: view,
            children: children.to_vec(),
        })
    }

    fn add_event_listeners(
        &mut self,
        view: ViewId,
        event_names: &[String],
    ) -> Result<(), BridgeError> {
        self.single(NativeOp::AddEventListeners {
            view_id: view,
            event_names: event_names.to_vec(),
        })
    }

    fn remove_event_listeners(
        &mut self,
        view: ViewId,
        event_names: &[String],
    ) -> Result<(), BridgeError> {
        self.single(NativeOp::RemoveEventListeners {
            view_id: view,
            event_names: event_names.to_vec(),
        })
    }

    fn apply_batch(&mut self, batch: &BatchedUpdate) -> BatchReport {
        let result = batch
            .to_json()
            .map_err(|e| BridgeError::new(BridgeErrorKind::Transport, e.to_string()))
            .and_then(|json| self.transport.commit(&json));
        match result {
            Ok(()) => BatchReport::success(),
            Err(err) => BatchReport::all_failed(batch.len(), &err),
        }
    }

    fn tunnel(
        &mut self,
        component_type: &str,
        method: &str,
        params: &JsonValue,
    ) -> Result<JsonValue, BridgeError> {
        let raw = self
            .transport
            .tunnel(component_type, method, &params.to_string())?;
        serde_json::from_str(&raw)
            .map_err(|e| BridgeError::new(BridgeErrorKind::Transport, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        calls: Vec<String>,
        fail_view: Option<ViewId>,
        transport_fail_view: Option<ViewId>,
        cancelled: bool,
    }

    impl Log {
        fn check(&mut self, name: &str, view: ViewId) -> Result<(), BridgeError> {
            self.calls.push(format!("{name}:{}", view.raw()));
            if self.transport_fail_view == Some(view) {
                return Err(BridgeError::new(BridgeErrorKind::Transport, "pipe closed"));
            }
            if self.fail_view == Some(view) {
                return Err(BridgeError::rejected("nope"));
            }
            Ok(())
        }
    }

    impl NativeBridge for Log {
        fn create_view(
            &mut self,
            view: ViewId,
            _: &str,
            _: &JsonMap<String, JsonValue>,
        ) -> Result<(), BridgeError> {
            self.check("create", view)
        }
        fn update_view(
            &mut self,
            view: ViewId,
            _: &JsonMap<String, JsonValue>,
            _: &[String],
        ) -> Result<(), BridgeError> {
            self.check("update", view)
        }
        fn delete_view(&mut self, view: ViewId) -> Result<(), BridgeError> {
            self.check("delete", view)
        }
        fn set_children(&mut self, view: ViewId, _: &[ViewId]) -> Result<(), BridgeError> {
            self.check("children", view)
        }
        fn add_event_listeners(&mut self, view: ViewId, _: &[String]) -> Result<(), BridgeError> {
            self.check("listen", view)
        }
        fn remove_event_listeners(
            &mut self,
            view: ViewId,
            _: &[String],
        ) -> Result<(), BridgeError> {
            self.check("unlisten", view)
        }
        fn cancel_batch(&mut self) {
            self.cancelled = true;
        }
    }

    fn batch() -> BatchedUpdate {
        vec![
            NativeOp::CreateView {
                view_id: ViewId::new(1),
                element_type: "View".into(),
                props: JsonMap::new(),
            },
            NativeOp::CreateView {
                view_id: ViewId::new(2),
                element_type: "View".into(),
                props: JsonMap::new(),
            },
            NativeOp::SetChildren {
                view_id: ViewId::new(1),
                children: vec![ViewId::new(2)],
            },
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn default_apply_batch_continues_past_rejections() {
        let mut log = Log {
            fail_view: Some(ViewId::new(2)),
            ..Log::default()
        };
        let report = log.apply_batch(&batch());
        assert_eq!(log.calls, vec!["create:1", "create:2", "children:1"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert!(!log.cancelled);
    }

    #[test]
    fn transport_failure_cancels_everything() {
        let mut log = Log {
            transport_fail_view: Some(ViewId::new(2)),
            ..Log::default()
        };
        let report = log.apply_batch(&batch());
        assert!(log.cancelled);
        assert_eq!(report.failures.len(), 3);
        assert_eq!(log.calls, vec!["create:1", "create:2"]);
    }

    #[test]
    fn default_tunnel_is_unsupported() {
        let mut log = Log::default();
        let err = log
            .tunnel("Camera", "snap", &JsonValue::Null)
            .unwrap_err();
        assert_eq!(err.kind(), BridgeErrorKind::Unsupported);
    }

    #[derive(Default)]
    struct Capture {
        payloads: Vec<String>,
        fail: bool,
    }

    impl JsonTransport for Capture {
        fn commit(&mut self, operations_json: &str) -> Result<(), BridgeError> {
            self.payloads.push(operations_json.to_owned());
            if self.fail {
                Err(BridgeError::rejected("bad batch"))
            } else {
                Ok(())
            }
        }

        fn tunnel(&mut self, _: &str, method: &str, params_json: &str) -> Result<String, BridgeError> {
            Ok(format!(r#"{{"method":"{method}","params":{params_json}}}"#))
        }
    }

    #[test]
    fn json_bridge_ships_one_payload_per_batch() {
        let mut bridge = JsonBridge::new(Capture::default());
        let report = bridge.apply_batch(&batch());
        assert!(report.is_success());
        assert_eq!(bridge.transport().payloads.len(), 1);
        let parsed = BatchedUpdate::from_json(&bridge.transport().payloads[0]).unwrap();
        assert_eq!(parsed, batch());
    }

    #[test]
    fn json_bridge_failure_fails_whole_batch() {
        let mut bridge = JsonBridge::new(Capture {
            fail: true,
            ..Capture::default()
        });
        let report = bridge.apply_batch(&batch());
        assert_eq!(report.failures.len(), 3);
    }

    #[test]
    fn json_bridge_tunnel_round_trips_json() {
        let mut bridge = JsonBridge::new(Capture::default());
        let result = bridge
            .tunnel("Camera", "zoom", &serde_json::json!({"level": 2}))
            .unwrap();
        assert_eq!(result, serde_json::json!({"method": "zoom", "params": {"level": 2}}));
    }
}
