//! Dataset cache with atomic snapshot replacement
//!
//! Readers load the current snapshot through a lock-free reference cell and
//! keep their `Arc` for as long as they need it. A commit swaps the whole
//! reference in one step, so a reader sees either the old snapshot or the new
//! one, never a mix. Commits are serialized by a short mutex that also owns
//! the version counter.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::debug;

use crate::snapshot::DatasetSnapshot;

/// Holds the current dataset snapshot, or nothing before the first refresh
pub struct DatasetCache<D> {
    current: ArcSwapOption<DatasetSnapshot<D>>,
    /// Last assigned version; held while committing
    commit_lock: Mutex<u64>,
}

impl<D> DatasetCache<D> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            commit_lock: Mutex::new(0),
        }
    }

    /// The current snapshot, or `None` if no data has been loaded yet
    ///
    /// `None` means "no data yet", not an error.
    pub fn read(&self) -> Option<Arc<DatasetSnapshot<D>>> {
        self.current.load_full()
    }

    /// True until the first snapshot is committed
    pub fn is_empty(&self) -> bool {
        self.current.load().is_none()
    }

    /// Version of the current snapshot (0 when empty)
    pub fn version(&self) -> u64 {
        self.current.load().as_ref().map_or(0, |s| s.version())
    }

    /// Install a new snapshot, replacing the current one in a single swap
    ///
    /// Returns the published handle. Readers holding the previous snapshot
    /// keep it alive until they drop it.
    pub fn commit(&self, mut snapshot: DatasetSnapshot<D>) -> Arc<DatasetSnapshot<D>> {
        let mut last_version = self.commit_lock.lock();
        *last_version += 1;
        snapshot.set_version(*last_version);

        let published = Arc::new(snapshot);
        self.current.store(Some(Arc::clone(&published)));

        debug!(
            version = published.version(),
            fingerprint = %published.fingerprint().short(),
            "Committed dataset snapshot"
        );
        published
    }
}

impl<D> Default for DatasetCache<D> {
    fn default() -> Self {
        Self::new()
    }
}
