#![forbid(unsafe_code)]

//! Prop diffing and the native operation model for DCFlight.
//!
//! - [`prop_diff`]: minimal per-node [`PropPatch`]es with atomic collections.
//! - [`interceptor`]: the [`ExtensionRegistry`] through which auxiliary
//!   subsystems filter patches before they are batched.
//! - [`ops`]: [`NativeOp`] and [`BatchedUpdate`], the payload handed to the
//!   native bridge once per flush.

pub mod interceptor;
pub mod ops;
pub mod prop_diff;

pub use interceptor::{ExtensionRegistry, IdentityTokenInterceptor, PropDiffInterceptor};
pub use ops::{BatchedUpdate, NativeOp, OpKind, OpPhase};
pub use prop_diff::{PatchValue, PropPatch, diff, wire_props};
