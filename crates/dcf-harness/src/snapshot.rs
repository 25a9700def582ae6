#![forbid(unsafe_code)]

//! Text snapshots of native trees.
//!
//! Snapshots live in `tests/snapshots/<name>.snap` next to the calling
//! crate's manifest. Run with `BLESS=1` to create or update them.

use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that switches comparison to recording.
pub const BLESS_ENV: &str = "BLESS";

/// Path of snapshot `name` under `manifest_dir`.
#[must_use]
pub fn snapshot_path(manifest_dir: &str, name: &str) -> PathBuf {
    Path::new(manifest_dir)
        .join("tests")
        .join("snapshots")
        .join(format!("{name}.snap"))
}

fn bless_requested() -> bool {
    std::env::var(BLESS_ENV).is_ok_and(|v| v == "1")
}

/// Compare `actual` against the stored snapshot, or store it under `BLESS=1`.
///
/// Line endings and trailing whitespace are normalized on both sides.
///
/// # Panics
///
/// On mismatch, on a missing snapshot without `BLESS=1`, or if the snapshot
/// file cannot be written.
pub fn assert_text_snapshot(name: &str, actual: &str, manifest_dir: &str) {
    let path = snapshot_path(manifest_dir, name);
    let actual = normalize(actual);

    if bless_requested() {
        if let Some(dir) = path.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                panic!("cannot create {}: {e}", dir.display());
            }
        }
        if let Err(e) = fs::write(&path, &actual) {
            panic!("cannot write snapshot {}: {e}", path.display());
        }
        tracing::info!(snapshot = name, path = %path.display(), "snapshot blessed");
        return;
    }

    let Ok(expected) = fs::read_to_string(&path) else {
        panic!(
            "missing snapshot `{name}` at {}; run with BLESS=1 to create it\n--- actual ---\n{actual}",
            path.display()
        );
    };
    let expected = normalize(&expected);
    if expected != actual {
        panic!(
            "snapshot `{name}` mismatch ({} vs {})\n--- expected ---\n{expected}--- actual ---\n{actual}",
            short_hash(&expected),
            short_hash(&actual)
        );
    }
}

fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn short_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().as_str()[..12].to_owned()
}
