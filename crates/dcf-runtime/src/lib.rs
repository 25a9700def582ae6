#![forbid(unsafe_code)]

//! Runtime for DCFlight: reconciliation, batching, and event routing.
//!
//! # Role in DCFlight
//! `dcf-runtime` turns render output into native view operations. It owns
//! the mounted tree, the identity maps, and the dirty set, and drives a
//! platform [`NativeBridge`] with one batch per tick.
//!
//! # Primary responsibilities
//! - **Reconciler**: diffs the mounted tree against a new render, preserving
//!   view identity ([`Reconciler`]).
//! - **UpdateBatcher**: coalesces dirty nodes into one bridge call per tick
//!   ([`UpdateBatcher`], [`UpdateScheduler`]).
//! - **EventRouter**: resolves inbound native events to handlers
//!   ([`EventRouter`]).
//! - **Runtime**: ties them together on the reconciliation thread
//!   ([`Runtime`]).
//!
//! # How it fits in the system
//! `dcf-core` defines what a render produces, `dcf-render` defines prop
//! patches and the wire operations, and this crate decides which operations
//! to send and when. Platform bridges implement [`NativeBridge`].
//!
//! # Feature flags
//! - `logging`: `logging::init` installs a `tracing-subscriber` pipeline.
//! - `config-file`: `RuntimeConfig::from_toml_str` and `RuntimeConfig::load`.

pub mod backoff;
pub mod batcher;
pub mod bridge;
pub mod config;
pub mod error;
#[cfg(feature = "logging")]
pub mod logging;
pub mod portal;
pub mod reconciler;
pub mod router;
pub mod runtime;
pub mod state;

pub use backoff::{ExponentialBackoff, poll_until};
pub use batcher::{FlushOutcome, UpdateBatcher, UpdateScheduler};
pub use bridge::{BatchReport, JsonBridge, JsonTransport, NativeBridge, OpFailure};
pub use config::{BackoffConfig, RuntimeConfig};
pub use error::{BridgeError, BridgeErrorKind, ConfigError, EventQueueClosed, NodeFailure, RenderError};
pub use portal::PortalRegistry;
pub use reconciler::{Pass, Reconciler, ReportOutcome};
pub use router::{DispatchOutcome, EventRouter};
pub use runtime::{EventSender, Runtime, TickOutcome};
pub use state::{State, Subscription};
