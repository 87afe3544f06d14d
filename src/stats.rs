//! Outcome and inventory types reported by the synchronizer.

use std::fmt;

/// Outcome of a full prefetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchStats {
    /// Resources downloaded and stored.
    pub fetched: usize,
    /// Resources that were already in the content cache.
    pub already_cached: usize,
    /// Resources whose download or store failed.
    pub failed: usize,
    /// Total bytes stored.
    pub bytes: u64,
}

impl PrefetchStats {
    /// Creates empty stats.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fetched: 0,
            already_cached: 0,
            failed: 0,
            bytes: 0,
        }
    }

    /// Records a stored resource of `size` bytes.
    pub const fn add_fetched(&mut self, size: u64) {
        self.fetched += 1;
        self.bytes += size;
    }

    /// Records a failed resource.
    pub const fn add_failed(&mut self) {
        self.failed += 1;
    }

    /// Returns true if every resource is now cached.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Relationship between the persisted manifest and the current table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestState {
    /// No manifest persisted: the next activation is a first install.
    Absent,
    /// The persisted manifest equals the current resource table.
    Current,
    /// The persisted manifest belongs to another version.
    Outdated,
}

impl fmt::Display for ManifestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::Current => "current",
            Self::Outdated => "outdated",
        })
    }
}

/// Inventory of the content cache against the resource table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheReport {
    /// Table keys present in the content cache.
    pub cached: Vec<String>,
    /// Table keys not yet cached.
    pub missing: Vec<String>,
    /// Content cache entries whose key the table doesn't list.
    pub stale: Vec<String>,
    /// Total body bytes of cached table resources.
    pub cached_bytes: u64,
    /// Entries waiting in the staging cache.
    pub staged: usize,
    /// State of the persisted manifest.
    pub manifest: ManifestState,
}

impl CacheReport {
    /// Returns true if every resource in the table can be served offline.
    #[must_use]
    pub fn offline_ready(&self) -> bool {
        self.missing.is_empty() && self.manifest == ManifestState::Current
    }
}
