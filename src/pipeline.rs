//! The indexing worker: classify, persist, mirror.
//!
//! Every change to the index goes through [`IndexingPipeline`], driven by a
//! single task draining the [`PendingQueue`]. Being the only writer keeps the
//! store and the mirror in step without any cross-structure locking.
//!
//! ## Per-event flow
//!
//! ```text
//! Changed(path)
//!   ├── file missing          → same as Deleted(path)
//!   ├── mtime == indexed mtime → nothing to do
//!   └── otherwise             → classify → store.upsert → mirror.upsert
//!
//! Deleted(path)               → store.delete → mirror.remove
//!
//! Reset                       → drop parked writes → store.clear → mirror.clear
//! ```
//!
//! ## Failed store writes
//!
//! The mirror is updated even when the store rejects a write, so queries keep
//! seeing the new state. The rejected write is parked, keyed by path, and
//! retried each time the queue runs dry and once more at shutdown. A newer
//! write for the same path replaces the parked one. After
//! `persistence.write_attempts` total attempts the write is abandoned with an
//! error log; the mirror still holds the record until the next restart.
//!
//! A failed `clear` during a reset is retried as a resync: clear the store,
//! then upsert every record the mirror holds.

use crate::cache::MemoryMirror;
use crate::imaging::MetadataExtractor;
use crate::metadata::{Classification, classify_file};
use crate::queue::{IndexEvent, PendingQueue};
use crate::store::{IndexStore, StoreError};
use crate::types::{ImageRecord, RatioCategory, system_time_ms};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of processing one `Changed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The file was classified and its record written.
    Indexed(RatioCategory),
    /// The record already matches the file on disk.
    Unchanged,
    /// The file is gone; its record (if any) was removed.
    Removed,
    /// The path exists but is not a regular file, or could not be read.
    Skipped,
}

/// A store write waiting to be applied.
#[derive(Debug, Clone, PartialEq)]
enum PendingWrite {
    Upsert(ImageRecord),
    Delete(PathBuf),
}

impl PendingWrite {
    fn apply(&self, store: &dyn IndexStore) -> Result<(), StoreError> {
        match self {
            PendingWrite::Upsert(record) => store.upsert(record),
            PendingWrite::Delete(path) => store.delete(path).map(|_| ()),
        }
    }

    fn path(&self) -> &Path {
        match self {
            PendingWrite::Upsert(record) => &record.path,
            PendingWrite::Delete(path) => path,
        }
    }
}

#[derive(Debug)]
struct Parked {
    write: PendingWrite,
    attempts: u32,
}

/// Writes the store has rejected, waiting for another try.
#[derive(Debug, Default)]
struct RetrySet {
    writes: BTreeMap<PathBuf, Parked>,
    /// Attempts spent on a failed reset, if one is outstanding.
    resync: Option<u32>,
}

/// Applies index events to the store and the mirror.
pub struct IndexingPipeline {
    store: Arc<dyn IndexStore>,
    mirror: Arc<MemoryMirror>,
    extractor: Arc<dyn MetadataExtractor>,
    write_attempts: u32,
    retries: Mutex<RetrySet>,
}

impl IndexingPipeline {
    pub fn new(
        store: Arc<dyn IndexStore>,
        mirror: Arc<MemoryMirror>,
        extractor: Arc<dyn MetadataExtractor>,
        write_attempts: u32,
    ) -> Self {
        Self {
            store,
            mirror,
            extractor,
            write_attempts: write_attempts.max(1),
            retries: Mutex::new(RetrySet::default()),
        }
    }

    /// Bring the record for `path` in line with the file on disk.
    ///
    /// Idempotent: a second call with the file untouched classifies nothing.
    pub async fn on_file_changed(&self, path: &Path) -> ChangeOutcome {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.on_file_deleted(path);
                return ChangeOutcome::Removed;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot stat file, skipping");
                return ChangeOutcome::Skipped;
            }
        };
        if !meta.is_file() {
            return ChangeOutcome::Skipped;
        }

        let modified_ms = meta.modified().map(system_time_ms).unwrap_or(0);
        if let Some(existing) = self.mirror.get(path)
            && !existing.is_stale(modified_ms)
        {
            debug!(path = %path.display(), "unchanged since last index");
            return ChangeOutcome::Unchanged;
        }

        let classification = self.classify(path).await;
        let record = classification.into_record(path.to_path_buf(), meta.len(), modified_ms);
        let category = record.category;
        debug!(
            path = %path.display(),
            category = %category,
            ratio = record.aspect_ratio,
            source = %record.source,
            "indexed"
        );
        self.write(PendingWrite::Upsert(record.clone()));
        self.mirror.upsert(record);
        ChangeOutcome::Indexed(category)
    }

    /// Remove the record for `path`. Returns whether one existed.
    pub fn on_file_deleted(&self, path: &Path) -> bool {
        let existed = self.mirror.contains(path);
        self.write(PendingWrite::Delete(path.to_path_buf()));
        self.mirror.remove(path);
        if existed {
            debug!(path = %path.display(), "removed from index");
        }
        existed
    }

    /// Drop the whole index: parked writes, store and mirror.
    pub fn reset(&self) {
        let mut retries = self.retries.lock();
        retries.writes.clear();
        retries.resync = None;
        if let Err(e) = self.store.clear() {
            if self.write_attempts > 1 {
                warn!(error = %e, "failed to clear index store, will resync from memory");
                retries.resync = Some(1);
            } else {
                error!(error = %e, "failed to clear index store");
            }
        }
        drop(retries);
        self.mirror.clear();
        info!("index cleared");
    }

    /// Apply one queued event.
    pub async fn handle(&self, event: IndexEvent) {
        match event {
            IndexEvent::Changed(path) => {
                self.on_file_changed(&path).await;
            }
            IndexEvent::Deleted(path) => {
                self.on_file_deleted(&path);
            }
            IndexEvent::Reset => self.reset(),
        }
    }

    /// Drain the queue until it is closed, then flush parked writes.
    pub async fn run(self: Arc<Self>, queue: Arc<PendingQueue>) {
        debug!("indexing worker started");
        while let Some(event) = queue.pop().await {
            self.handle(event).await;
            if queue.is_empty() {
                self.retry_parked();
            }
            queue.complete();
        }
        self.flush_parked();
        debug!("indexing worker stopped");
    }

    /// Number of store writes waiting for a retry.
    pub fn parked_writes(&self) -> usize {
        let retries = self.retries.lock();
        retries.writes.len() + usize::from(retries.resync.is_some())
    }

    async fn classify(&self, path: &Path) -> Classification {
        let extractor = Arc::clone(&self.extractor);
        let owned = path.to_path_buf();
        match tokio::task::spawn_blocking(move || classify_file(&owned, extractor.as_ref())).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "metadata task failed, using default ratio");
                Classification::fallback()
            }
        }
    }

    fn write(&self, write: PendingWrite) {
        let mut retries = self.retries.lock();
        retries.writes.remove(write.path());
        if let Err(e) = write.apply(self.store.as_ref()) {
            self.park(&mut retries, write, 1, &e);
        }
    }

    fn park(&self, retries: &mut RetrySet, write: PendingWrite, attempts: u32, e: &StoreError) {
        if attempts >= self.write_attempts {
            error!(
                path = %write.path().display(),
                attempts,
                error = %e,
                "giving up on index write"
            );
            return;
        }
        warn!(
            path = %write.path().display(),
            attempts,
            error = %e,
            "index write failed, will retry"
        );
        retries
            .writes
            .insert(write.path().to_path_buf(), Parked { write, attempts });
    }

    /// One retry pass over everything parked.
    fn retry_parked(&self) {
        let mut retries = self.retries.lock();
        if retries.writes.is_empty() && retries.resync.is_none() {
            return;
        }

        if let Some(attempts) = retries.resync.take() {
            match self.resync() {
                Ok(restored) => {
                    info!(records = restored, "index store resynced from memory");
                    // The resync rewrote every live record.
                    retries.writes.clear();
                }
                Err(e) if attempts + 1 >= self.write_attempts => {
                    error!(attempts = attempts + 1, error = %e, "giving up on index store resync");
                }
                Err(e) => {
                    warn!(attempts = attempts + 1, error = %e, "index store resync failed, will retry");
                    retries.resync = Some(attempts + 1);
                }
            }
        }

        let parked = std::mem::take(&mut retries.writes);
        for (_, Parked { write, attempts }) in parked {
            if let Err(e) = write.apply(self.store.as_ref()) {
                self.park(&mut retries, write, attempts + 1, &e);
            }
        }
    }

    /// Retry until nothing is parked or every write has used its attempts.
    fn flush_parked(&self) {
        while self.parked_writes() > 0 {
            self.retry_parked();
        }
    }

    fn resync(&self) -> Result<usize, StoreError> {
        self.store.clear()?;
        let records = self.mirror.snapshot();
        for record in &records {
            self.store.upsert(record)?;
        }
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockExtractor;
    use crate::store::SqliteStore;
    use crate::test_helpers::{FlakyStore, record, write_garbage, write_png};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        store: Arc<FlakyStore>,
        mirror: Arc<MemoryMirror>,
        extractor: Arc<MockExtractor>,
        pipeline: IndexingPipeline,
    }

    fn fixture(write_attempts: u32) -> Fixture {
        let store = Arc::new(FlakyStore::new());
        let mirror = Arc::new(MemoryMirror::new());
        let extractor = Arc::new(MockExtractor::new());
        let pipeline = IndexingPipeline::new(
            store.clone(),
            mirror.clone(),
            extractor.clone(),
            write_attempts,
        );
        Fixture {
            tmp: TempDir::new().unwrap(),
            store,
            mirror,
            extractor,
            pipeline,
        }
    }

    impl Fixture {
        /// Create a file on disk and teach the mock its dimensions.
        fn image(&self, name: &str, width: u32, height: u32) -> PathBuf {
            let path = self.tmp.path().join(name);
            write_garbage(&path);
            self.extractor.set(path.clone(), width, height);
            path
        }
    }

    // =========================================================================
    // on_file_changed
    // =========================================================================

    #[tokio::test]
    async fn changed_file_is_indexed_in_store_and_mirror() {
        let f = fixture(3);
        let path = f.image("b.jpg", 1920, 1080);

        let outcome = f.pipeline.on_file_changed(&path).await;

        assert_eq!(outcome, ChangeOutcome::Indexed(RatioCategory::Widescreen));
        let stored = f.store.get(&path).unwrap().unwrap();
        assert_eq!(stored.aspect_ratio, 1.78);
        assert_eq!(f.mirror.get(&path), Some(stored));
    }

    #[tokio::test]
    async fn second_change_without_modification_is_noop() {
        let f = fixture(3);
        let path = f.image("b.jpg", 1920, 1080);

        f.pipeline.on_file_changed(&path).await;
        let before = f.store.get(&path).unwrap();
        let outcome = f.pipeline.on_file_changed(&path).await;

        assert_eq!(outcome, ChangeOutcome::Unchanged);
        assert_eq!(f.extractor.call_count(), 1);
        assert_eq!(f.store.get(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn modified_file_is_reclassified() {
        let f = fixture(3);
        let path = f.image("b.jpg", 1920, 1080);
        f.pipeline.on_file_changed(&path).await;

        // Rotate the image and bump its mtime.
        f.extractor.set(path.clone(), 1080, 1920);
        let later = std::time::SystemTime::now() + Duration::from_secs(60);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let outcome = f.pipeline.on_file_changed(&path).await;
        assert_eq!(outcome, ChangeOutcome::Indexed(RatioCategory::Portrait));
        assert_eq!(f.extractor.call_count(), 2);
        assert_eq!(
            f.store.get(&path).unwrap().unwrap().category,
            RatioCategory::Portrait
        );
    }

    #[tokio::test]
    async fn filename_resolution_skips_extraction() {
        let f = fixture(3);
        let path = f.tmp.path().join("a_3440x1440.jpg");
        write_garbage(&path);

        let outcome = f.pipeline.on_file_changed(&path).await;

        assert_eq!(outcome, ChangeOutcome::Indexed(RatioCategory::Ultrawide));
        assert_eq!(f.extractor.call_count(), 0);
    }

    #[tokio::test]
    async fn undecodable_file_is_kept_as_widescreen() {
        let f = fixture(3);
        let path = f.tmp.path().join("c_corrupt.jpg");
        write_garbage(&path);

        let outcome = f.pipeline.on_file_changed(&path).await;

        assert_eq!(outcome, ChangeOutcome::Indexed(RatioCategory::Widescreen));
        let stored = f.store.get(&path).unwrap().unwrap();
        assert_eq!(stored.aspect_ratio, 1.78);
        assert_eq!(stored.dimensions, None);
    }

    #[tokio::test]
    async fn real_png_through_image_crate() {
        let tmp = TempDir::new().unwrap();
        let store: Arc<dyn IndexStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mirror = Arc::new(MemoryMirror::new());
        let pipeline = IndexingPipeline::new(
            store.clone(),
            mirror,
            Arc::new(crate::imaging::ImageCrateExtractor::new()),
            3,
        );
        let path = tmp.path().join("b.jpg");
        write_png(&path, 192, 108);

        pipeline.on_file_changed(&path).await;

        let stored = store.get(&path).unwrap().unwrap();
        assert_eq!(stored.category, RatioCategory::Widescreen);
        assert_eq!(stored.format.as_deref(), Some("png"));
    }

    #[tokio::test]
    async fn missing_file_is_removed() {
        let f = fixture(3);
        let path = f.image("b.jpg", 1920, 1080);
        f.pipeline.on_file_changed(&path).await;
        std::fs::remove_file(&path).unwrap();

        let outcome = f.pipeline.on_file_changed(&path).await;

        assert_eq!(outcome, ChangeOutcome::Removed);
        assert!(f.store.get(&path).unwrap().is_none());
        assert!(!f.mirror.contains(&path));
    }

    #[tokio::test]
    async fn directory_is_skipped() {
        let f = fixture(3);
        let dir = f.tmp.path().join("folder.jpg");
        std::fs::create_dir(&dir).unwrap();
        assert_eq!(f.pipeline.on_file_changed(&dir).await, ChangeOutcome::Skipped);
    }

    // =========================================================================
    // on_file_deleted / reset
    // =========================================================================

    #[tokio::test]
    async fn delete_absent_path_is_not_an_error() {
        let f = fixture(3);
        assert!(!f.pipeline.on_file_deleted(Path::new("/nowhere/x.jpg")));
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let f = fixture(3);
        let path = f.image("b.jpg", 1920, 1080);
        f.pipeline.on_file_changed(&path).await;

        assert!(f.pipeline.on_file_deleted(&path));
        assert!(f.store.scan_all().unwrap().is_empty());
        assert!(f.mirror.is_empty());
    }

    #[tokio::test]
    async fn reset_clears_store_and_mirror() {
        let f = fixture(3);
        let path = f.image("b.jpg", 1920, 1080);
        f.pipeline.on_file_changed(&path).await;

        f.pipeline.reset();

        assert!(f.store.scan_all().unwrap().is_empty());
        assert!(f.mirror.is_empty());
    }

    // =========================================================================
    // Store failures
    // =========================================================================

    #[tokio::test]
    async fn store_failure_still_updates_mirror() {
        let f = fixture(3);
        let path = f.image("b.jpg", 1920, 1080);
        f.store.set_failing(true);

        let outcome = f.pipeline.on_file_changed(&path).await;

        assert_eq!(outcome, ChangeOutcome::Indexed(RatioCategory::Widescreen));
        assert!(f.mirror.contains(&path));
        assert_eq!(f.pipeline.parked_writes(), 1);
        assert!(f.store.inner().get(&path).unwrap().is_none());
    }

    #[tokio::test]
    async fn parked_write_lands_on_retry() {
        let f = fixture(3);
        let path = f.image("b.jpg", 1920, 1080);
        f.store.set_failing(true);
        f.pipeline.on_file_changed(&path).await;

        f.store.set_failing(false);
        f.pipeline.retry_parked();

        assert_eq!(f.pipeline.parked_writes(), 0);
        assert!(f.store.get(&path).unwrap().is_some());
    }

    #[tokio::test]
    async fn parked_write_abandoned_after_attempts() {
        let f = fixture(2);
        let path = f.image("b.jpg", 1920, 1080);
        f.store.set_failing(true);
        f.pipeline.on_file_changed(&path).await;
        assert_eq!(f.pipeline.parked_writes(), 1);

        f.pipeline.retry_parked(); // second and last attempt
        assert_eq!(f.pipeline.parked_writes(), 0);
        assert_eq!(f.store.rejected(), 2);
    }

    #[tokio::test]
    async fn newer_write_replaces_parked_one() {
        let f = fixture(3);
        f.store.inner().upsert(&record("/w/gone.jpg", 1.78, RatioCategory::Widescreen)).unwrap();
        f.mirror.upsert(record("/w/gone.jpg", 1.78, RatioCategory::Widescreen));

        f.store.set_failing(true);
        f.pipeline.on_file_deleted(Path::new("/w/gone.jpg"));
        f.pipeline.on_file_deleted(Path::new("/w/gone.jpg"));
        assert_eq!(f.pipeline.parked_writes(), 1);

        f.store.set_failing(false);
        f.pipeline.retry_parked();
        assert!(f.store.get(Path::new("/w/gone.jpg")).unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_reset_resyncs_from_mirror() {
        let f = fixture(3);
        f.store.inner().upsert(&record("/w/stale.jpg", 1.78, RatioCategory::Widescreen)).unwrap();
        f.store.set_failing(true);
        f.pipeline.reset();
        let path = f.image("b.jpg", 1080, 1920);
        f.pipeline.on_file_changed(&path).await;

        f.store.set_failing(false);
        f.pipeline.retry_parked();

        let stored: Vec<PathBuf> = f.store.scan_all().unwrap().into_iter().map(|r| r.path).collect();
        assert_eq!(stored, vec![path]);
        assert_eq!(f.pipeline.parked_writes(), 0);
    }

    // =========================================================================
    // Worker
    // =========================================================================

    #[tokio::test]
    async fn worker_drains_queue_and_flushes_on_close() {
        let f = fixture(3);
        let pipeline = Arc::new(f.pipeline);
        let queue = Arc::new(PendingQueue::new());
        let a = f.tmp.path().join("a_3440x1440.jpg");
        write_garbage(&a);
        let b = f.tmp.path().join("b.jpg");
        write_garbage(&b);
        f.extractor.set(b.clone(), 1920, 1080);

        let worker = tokio::spawn(Arc::clone(&pipeline).run(Arc::clone(&queue)));
        queue.push(IndexEvent::Changed(a.clone()));
        queue.push(IndexEvent::Changed(b.clone()));
        queue.wait_idle().await;

        assert_eq!(f.mirror.len(), 2);
        assert_eq!(
            f.store.scan_by_category(RatioCategory::Ultrawide).unwrap()[0].path,
            a
        );

        // A write rejected now is flushed at shutdown once the store recovers.
        f.store.set_failing(true);
        queue.push(IndexEvent::Deleted(b.clone()));
        queue.wait_idle().await;
        f.store.set_failing(false);
        queue.close();
        worker.await.unwrap();

        assert!(f.store.get(&b).unwrap().is_none());
        assert_eq!(pipeline.parked_writes(), 0);
    }
}
