#![forbid(unsafe_code)]

//! DCFlight public facade.
//!
//! Re-exports the node model, the prop differ and the runtime under one
//! crate. Most applications only need [`prelude`]:
//!
//! ```ignore
//! use dcf::prelude::*;
//!
//! let mut runtime = Runtime::new(my_bridge);
//! runtime.render(&ComponentNode::element("Text").prop("content", "Hello"))?;
//! ```
//!
//! # Feature flags
//! - `logging`: forwards to `dcf-runtime/logging`.
//! - `config-file`: forwards to `dcf-runtime/config-file`.

pub use dcf_core as core;
pub use dcf_render as render;
pub use dcf_runtime as runtime;

pub use dcf_core::{ComponentNode, NativeEvent, PropMap, PropValue, ViewId};
pub use dcf_runtime::{NativeBridge, Runtime, RuntimeConfig};

/// Everything needed to build trees, run a runtime and implement a bridge.
pub mod prelude {
    pub use dcf_core::{
        ChildKey, ComponentNode, EventData, Handler, HandlerError, NativeEvent, NodeId,
        PropMap, PropValue, ViewId,
    };
    pub use dcf_render::{
        BatchedUpdate, NativeOp, OpKind, PropDiffInterceptor, PropPatch,
    };
    pub use dcf_runtime::{
        BatchReport, BridgeError, BridgeErrorKind, DispatchOutcome, NativeBridge, RenderError,
        Runtime, RuntimeConfig, State,
    };
}
