#![forbid(unsafe_code)]

//! Node model for the DCFlight native view reconciler.
//!
//! This crate holds the data a render pass produces and the reconciler
//! consumes:
//!
//! - [`value`]: the closed prop-value model and event handler handles.
//! - [`node`]: [`ComponentNode`] trees (elements, components, fragments, portals).
//! - [`identity`]: node identities, native view ids, and sibling keys.
//! - [`event`]: inbound native events and event-name normalization.
//!
//! Tree construction is pure. All mutation happens in `dcf-runtime`.

pub mod event;
pub mod identity;
pub mod node;
pub mod value;

pub use event::{NativeEvent, normalize_event_name};
pub use identity::{ChildKey, NodeId, ViewId, ViewIdAllocator};
pub use node::{ComponentKind, ComponentNode, NodeKind, RenderFn};
pub use value::{
    EventData, Handler, HandlerArgs, HandlerError, InvokeError, PropMap, PropValue,
};
