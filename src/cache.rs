//! In-memory mirror of the persistent index.
//!
//! The index is a two-tier cache. The [`IndexStore`](crate::store::IndexStore)
//! is the source of truth; the [`MemoryMirror`] is a read-through copy of it
//! that answers scored fallback queries and statistics without touching
//! SQLite, and keeps answering when SQLite does not.
//!
//! # Ownership
//!
//! Only the indexing worker writes to the mirror; the mutating methods are
//! crate-private and called from [`pipeline`](crate::pipeline) alone. Query
//! callers get cloned snapshots, so a reader never holds the lock while it
//! does I/O and never observes a half-written record: records are replaced
//! whole.
//!
//! # Lifecycle
//!
//! ```text
//! startup        load(store.scan_all())      mirror == store
//! indexing       upsert / remove per event   mirror tracks worker writes
//! store outage   upsert / remove continue    mirror ahead of store
//! reanalyze      clear, then rebuilt         mirror == store again
//! ```

use crate::types::{ImageRecord, RatioCategory};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Path-keyed copy of every indexed record.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    records: RwLock<HashMap<PathBuf, ImageRecord>>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole mirror with records loaded from the store.
    pub(crate) fn load(&self, records: Vec<ImageRecord>) {
        let map = records
            .into_iter()
            .map(|r| (r.path.clone(), r))
            .collect();
        *self.records.write() = map;
    }

    pub(crate) fn upsert(&self, record: ImageRecord) {
        self.records.write().insert(record.path.clone(), record);
    }

    pub(crate) fn remove(&self, path: &Path) -> Option<ImageRecord> {
        self.records.write().remove(path)
    }

    pub(crate) fn clear(&self) {
        self.records.write().clear();
    }

    pub fn get(&self, path: &Path) -> Option<ImageRecord> {
        self.records.read().get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.read().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Cloned copy of every record, in no particular order.
    pub fn snapshot(&self) -> Vec<ImageRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Paths of records at or below `prefix` (a file or a directory).
    pub fn paths_under(&self, prefix: &Path) -> Vec<PathBuf> {
        self.records
            .read()
            .keys()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Record count per category, with every category present.
    pub fn category_counts(&self) -> BTreeMap<RatioCategory, usize> {
        let mut counts: BTreeMap<RatioCategory, usize> =
            RatioCategory::ALL.into_iter().map(|c| (c, 0)).collect();
        for record in self.records.read().values() {
            *counts.entry(record.category).or_default() += 1;
        }
        counts
    }
}
