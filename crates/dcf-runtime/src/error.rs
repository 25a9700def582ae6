#![forbid(unsafe_code)]

//! Error types for the runtime.
//!
//! # Taxonomy
//!
//! | Error | Raised by | Surfaced to |
//! |-------|-----------|-------------|
//! | [`BridgeError`] | native bridge, per operation | recorded per node; returned only from explicit renders |
//! | [`RenderError`] | `Runtime::render` / `Runtime::unmount` | the awaiting caller |
//! | stale view ids | reconciler, event router | logged only |
//! | handler failures | event router | logged only |
//! | [`ConfigError`] | config loading | caller |

use std::fmt;

use dcf_core::identity::{NodeId, ViewId};
use dcf_render::ops::OpKind;

/// Category of a bridge failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeErrorKind {
    /// The native side refused the operation.
    Rejected,
    /// The operation referenced a view the native side does not know.
    UnknownView,
    /// The bridge does not implement the call.
    Unsupported,
    /// The channel to the native side failed; nothing in the batch applied.
    Transport,
}

/// Failure reported by the native bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeError {
    kind: BridgeErrorKind,
    message: String,
}

impl BridgeError {
    /// Create a bridge error.
    pub fn new(kind: BridgeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`BridgeErrorKind::Rejected`].
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::Rejected, message)
    }

    /// Shorthand for [`BridgeErrorKind::Unsupported`].
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::Unsupported, message)
    }

    /// Failure category.
    #[must_use]
    pub const fn kind(&self) -> BridgeErrorKind {
        self.kind
    }

    /// Human-readable detail.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            BridgeErrorKind::Rejected => "rejected",
            BridgeErrorKind::UnknownView => "unknown view",
            BridgeErrorKind::Unsupported => "unsupported",
            BridgeErrorKind::Transport => "transport failure",
        };
        write!(f, "bridge {kind}: {}", self.message)
    }
}

impl std::error::Error for BridgeError {}

/// A bridge failure attributed to one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    /// Node whose operation failed, if it is still mounted.
    pub node: Option<NodeId>,
    /// View the operation targeted.
    pub view: ViewId,
    /// Operation that failed.
    pub operation: OpKind,
    /// Bridge error.
    pub error: BridgeError,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node {
            Some(node) => write!(
                f,
                "{} on {} ({node}) failed: {}",
                self.operation, self.view, self.error
            ),
            None => write!(f, "{} on {} failed: {}", self.operation, self.view, self.error),
        }
    }
}

/// Error returned from an explicit, awaited render request.
///
/// The batch was still flushed for every node that reconciled successfully;
/// the failed nodes are left pending and retried on a later tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError {
    failures: Vec<NodeFailure>,
}

impl RenderError {
    /// Wrap a non-empty failure list.
    #[must_use]
    pub fn new(failures: Vec<NodeFailure>) -> Self {
        Self { failures }
    }

    /// Failures of this render.
    #[must_use]
    pub fn failures(&self) -> &[NodeFailure] {
        &self.failures
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} native operation(s) failed", self.failures.len())?;
        if let Some(first) = self.failures.first() {
            write!(f, "; first: {first}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RenderError {}

/// Error loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read.
    Io(String),
    /// The document could not be parsed.
    Parse(String),
    /// A value is out of range.
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it is invalid.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "config read error: {msg}"),
            Self::Parse(msg) => write!(f, "config parse error: {msg}"),
            Self::Invalid { field, reason } => write!(f, "invalid config `{field}`: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// The event queue's receiving side is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventQueueClosed;

impl fmt::Display for EventQueueClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("event queue closed")
    }
}

impl std::error::Error for EventQueueClosed {}
