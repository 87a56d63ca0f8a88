//! Monotonic version counters for cheap staleness checks.
//!
//! Downstream consumers (a compiler front end, diagnostics) remember the
//! last project/file versions they observed and compare them against the
//! current ones. Equality comparison only, never a structural diff.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use url::Url;

use solls_workspace::paths::normalize_uri;

/// Project-wide and per-file version counters.
///
/// The project version increments when the set of workspace files changes;
/// file versions increment on every content-affecting operation, including
/// `didClose` (which leaves content untouched but marks downstream caches
/// unverified). Versions only ever grow and are never reused.
#[derive(Debug, Default)]
pub struct Versions {
    project: AtomicU64,
    files: DashMap<Url, u64>,
}

impl Versions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn project_version(&self) -> u64 {
        self.project.load(Ordering::SeqCst)
    }

    pub fn bump_project(&self) -> u64 {
        self.project.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current version of a file; `0` for files never touched.
    #[must_use]
    pub fn file_version(&self, uri: &Url) -> u64 {
        self.files
            .get(&normalize_uri(uri))
            .map_or(0, |entry| *entry.value())
    }

    /// Strictly increase a file's version and return the new value.
    pub fn bump_file(&self, uri: &Url) -> u64 {
        let mut entry = self.files.entry(normalize_uri(uri)).or_insert(0);
        *entry += 1;
        *entry
    }
}
