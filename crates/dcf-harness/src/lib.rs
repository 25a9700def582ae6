#![forbid(unsafe_code)]

//! Test harness and reference fixtures for DCFlight.
//!
//! # Role in DCFlight
//! `dcf-harness` stands in for the platform. Its [`RecordingBridge`] applies
//! every operation to an in-memory [`NativeTree`] that rejects what a real
//! platform would reject, so tests assert on the resulting view hierarchy as
//! well as on the operations that produced it.
//!
//! # Primary responsibilities
//! - **Native simulation**: [`NativeTree`], [`RecordingBridge`] with scripted
//!   per-op and transport failures.
//! - **Assertions**: [`assert_ops!`] for operation counts,
//!   [`assert_snapshot!`] for text snapshots of the native tree.
//! - **Fixtures**: reference trees, recording handlers and proptest
//!   strategies ([`fixtures`]).
//!
//! Run `BLESS=1 cargo test --package dcf-harness` to create/update snapshots.

pub mod fixtures;
pub mod native;
pub mod snapshot;

pub use dcf_render::ops::{BatchedUpdate, OpKind};
pub use native::{NativeTree, NativeView, RecordingBridge, ScriptedFailure};

/// Assert the exact operation mix of a batch.
///
/// Every listed kind must match its count and the batch must hold nothing
/// else.
///
/// ```ignore
/// assert_ops!(batch, { CreateView: 3, SetChildren: 2 });
/// ```
#[macro_export]
macro_rules! assert_ops {
    ($batch:expr, { $($kind:ident : $count:expr),* $(,)? }) => {{
        let batch: &$crate::BatchedUpdate = $batch;
        $(
            assert_eq!(
                batch.count($crate::OpKind::$kind),
                $count,
                "{} count mismatch in {:#?}",
                stringify!($kind),
                batch.ops()
            );
        )*
        let expected: usize = 0 $(+ $count)*;
        assert_eq!(batch.len(), expected, "unexpected extra ops in {:#?}", batch.ops());
    }};
}

/// Compare a [`NativeTree`]'s dump against `tests/snapshots/<name>.snap`.
#[macro_export]
macro_rules! assert_snapshot {
    ($name:expr, $tree:expr) => {
        $crate::snapshot::assert_text_snapshot(
            $name,
            &$crate::NativeTree::dump($tree),
            env!("CARGO_MANIFEST_DIR"),
        )
    };
}
