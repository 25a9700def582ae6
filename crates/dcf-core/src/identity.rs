#![forbid(unsafe_code)]

//! Identity types used to match nodes across render passes.
//!
//! - [`NodeId`]: opaque, process-unique identity of a logical node. Assigned
//!   when a node is first mounted and kept for as long as the reconciler keeps
//!   matching it.
//! - [`ViewId`]: identifier of the native view bound to a node. Serialized as
//!   a bare integer on the wire.
//! - [`ChildKey`]: the sibling-local key that decides whether a child in the
//!   new tree is "the same" child as one in the old tree.
//!
//! # Matching rule
//!
//! A child with an explicit key is identified by `(parent, key)`. A child
//! without one is identified by `(parent, type tag, ordinal)` where the
//! ordinal counts only unkeyed siblings sharing that type tag. Counting per
//! type tag keeps heterogeneous unkeyed siblings matched when one of them
//! moves past a sibling of another kind.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Global counter for node identities.
static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique logical node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate a fresh identity.
    #[must_use]
    pub fn next() -> Self {
        Self(NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Identifier of a native view on the bridge side.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ViewId(u32);

impl ViewId {
    /// The pre-existing native root container.
    pub const ROOT: Self = Self(0);

    /// Wrap a raw id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Monotonic allocator for [`ViewId`]s.
///
/// Ids are never reused within one allocator; a deleted view's id stays
/// retired so a stale reference can never alias a new view. Once `u32::MAX`
/// has been handed out the allocator is exhausted and returns `None`.
#[derive(Debug, Clone)]
pub struct ViewIdAllocator {
    next: Option<u32>,
}

impl ViewIdAllocator {
    /// Start allocating at `first`.
    #[must_use]
    pub const fn starting_at(first: u32) -> Self {
        Self { next: Some(first) }
    }

    /// Allocate the next id, or `None` once the id space is used up.
    pub fn allocate(&mut self) -> Option<ViewId> {
        let raw = self.next?;
        self.next = raw.checked_add(1);
        Some(ViewId(raw))
    }

    /// Peek at the id the next call to [`allocate`](Self::allocate) returns.
    #[must_use]
    pub const fn peek(&self) -> Option<ViewId> {
        match self.next {
            Some(raw) => Some(ViewId(raw)),
            None => None,
        }
    }

    /// Whether every id has been handed out.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }
}

impl Default for ViewIdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// Sibling-local identity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChildKey {
    /// Explicit key prop.
    Keyed(String),
    /// Ordinal among unkeyed siblings with the same type tag.
    Positional {
        /// Type tag of the node (element type, component name, ...).
        type_tag: String,
        /// Ordinal among unkeyed siblings sharing `type_tag`.
        index: usize,
    },
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyed(key) => write!(f, "key={key}"),
            Self::Positional { type_tag, index } => write!(f, "{type_tag}[{index}]"),
        }
    }
}
