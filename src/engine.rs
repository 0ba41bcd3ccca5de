//! The cache engine: lifecycle and public operations.
//!
//! [`CacheEngine`] owns every moving part and is the only type a host
//! process needs. It wires them together like this:
//!
//! ```text
//!  ChangeWatcher ──┐
//!  startup replay ─┼──► PendingQueue ──► worker: IndexingPipeline ──► store + mirror
//!  reanalyze ──────┤                                                     │
//!  QueryEngine ────┘ (self-healing deletes)            QueryEngine ◄─────┘
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ─► Loading ─► Watching ◄─► Reanalyzing
//!                     │          │
//!                     └──────────┴────────► Stopped
//! ```
//!
//! - **Loading**: the mirror is filled from the store and every file under
//!   the root is replayed through the queue. [`CacheEngine::start`] returns
//!   once the replay has been indexed. If the root does not exist the engine
//!   stays here with whatever the store held; queries still work.
//! - **Watching**: the watcher feeds live changes.
//! - **Reanalyzing**: the index is being rebuilt from scratch.
//! - **Stopped**: after [`CacheEngine::shutdown`]; every operation fails with
//!   [`EngineError::Stopped`].

use crate::cache::MemoryMirror;
use crate::config::{ConfigError, EngineConfig};
use crate::imaging::{ImageCrateExtractor, MetadataExtractor};
use crate::pipeline::IndexingPipeline;
use crate::query::{QueryEngine, classify_requested_resolution};
use crate::queue::{IndexEvent, PendingQueue};
use crate::scan::{ScanError, scan_tree};
use crate::store::{IndexStore, SqliteStore, StoreError};
use crate::types::RatioCategory;
use crate::watcher::ChangeWatcher;
use parking_lot::Mutex;
use rand::seq::IndexedRandom;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine is stopped")]
    Stopped,
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Uninitialized,
    Loading,
    Watching,
    Reanalyzing,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Loading => "loading",
            EngineState::Watching => "watching",
            EngineState::Reanalyzing => "reanalyzing",
            EngineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Which tier answered a statistics request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsSource {
    Store,
    Memory,
}

/// Index size per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_images: usize,
    /// Every category is present, zero-filled.
    pub per_category: BTreeMap<RatioCategory, usize>,
    pub source: StatsSource,
}

impl Statistics {
    fn from_counts(counts: BTreeMap<RatioCategory, usize>, source: StatsSource) -> Self {
        let mut per_category: BTreeMap<RatioCategory, usize> =
            RatioCategory::ALL.into_iter().map(|c| (c, 0)).collect();
        per_category.extend(counts);
        Self {
            total_images: per_category.values().sum(),
            per_category,
            source,
        }
    }
}

/// A randomly picked image and how it was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub path: PathBuf,
    /// Category the caller asked for.
    pub requested: RatioCategory,
    /// Category whose query produced the image; `widescreen` after a fallback.
    pub served: RatioCategory,
    /// Number of candidates the image was picked from.
    pub candidates: usize,
}

impl Selection {
    pub fn is_fallback(&self) -> bool {
        self.requested != self.served
    }
}

/// Ratio-indexed image cache over one directory tree.
pub struct CacheEngine {
    config: EngineConfig,
    state: Mutex<EngineState>,
    store: Arc<dyn IndexStore>,
    mirror: Arc<MemoryMirror>,
    queue: Arc<PendingQueue>,
    query: QueryEngine,
    watcher: Mutex<Option<ChangeWatcher>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    reanalysis: tokio::sync::Mutex<()>,
}

impl CacheEngine {
    /// Open the configured SQLite store and start with the `image` crate extractor.
    pub async fn open(config: EngineConfig) -> Result<Self, EngineError> {
        let store = Arc::new(SqliteStore::open(&config.database)?);
        Self::start(config, store, Arc::new(ImageCrateExtractor::new())).await
    }

    /// Build the index and begin watching.
    ///
    /// Must be called inside a tokio runtime. Returns once the files present
    /// at startup have been indexed.
    pub async fn start(
        config: EngineConfig,
        store: Arc<dyn IndexStore>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let mirror = Arc::new(MemoryMirror::new());
        let queue = Arc::new(PendingQueue::new());
        let pipeline = Arc::new(IndexingPipeline::new(
            Arc::clone(&store),
            Arc::clone(&mirror),
            extractor,
            config.persistence.write_attempts,
        ));
        let query = QueryEngine::new(Arc::clone(&store), Arc::clone(&mirror), Arc::clone(&queue));

        let engine = Self {
            config,
            state: Mutex::new(EngineState::Uninitialized),
            store,
            mirror,
            queue,
            query,
            watcher: Mutex::new(None),
            worker: Mutex::new(None),
            reanalysis: tokio::sync::Mutex::new(()),
        };
        engine.set_state(EngineState::Loading);

        match engine.store.scan_all() {
            Ok(records) => {
                info!(records = records.len(), "loaded index from store");
                engine.mirror.load(records);
            }
            Err(e) => warn!(error = %e, "cannot load stored index, starting empty"),
        }

        let worker = tokio::spawn(pipeline.run(Arc::clone(&engine.queue)));
        *engine.worker.lock() = Some(worker);

        let root = engine.config.wallpaper_dir.clone();
        if !root.is_dir() {
            warn!(root = %root.display(), "wallpaper directory not found, serving the stored index only");
            return Ok(engine);
        }

        engine.ensure_watching(&root);

        let queued = match engine.replay(&root).await {
            Ok(queued) => queued,
            Err(e) => {
                engine.shutdown().await?;
                return Err(e);
            }
        };
        engine.queue.wait_idle().await;
        info!(files = queued, indexed = engine.mirror.len(), "initial index ready");
        engine.set_state(EngineState::Watching);
        Ok(engine)
    }

    /// Queue every file on disk, and deletion of every record without one.
    async fn replay(&self, root: &Path) -> Result<usize, EngineError> {
        let files = self.walk(root).await?;
        let on_disk: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();
        for path in self.mirror.snapshot().into_iter().map(|r| r.path) {
            if !on_disk.contains(path.as_path()) {
                self.queue.push(IndexEvent::Deleted(path));
            }
        }
        let count = files.len();
        for file in files {
            self.queue.push(IndexEvent::Changed(file));
        }
        Ok(count)
    }

    async fn walk(&self, root: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let root = root.to_path_buf();
        let filter = self.config.scan_filter();
        let files = tokio::task::spawn_blocking(move || scan_tree(&root, &filter)).await??;
        Ok(files)
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start the watcher if it is enabled and not already running.
    fn ensure_watching(&self, root: &Path) {
        if !self.config.watcher.enabled {
            return;
        }
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return;
        }
        match ChangeWatcher::start(
            root,
            self.config.scan_filter(),
            Arc::clone(&self.queue),
            Arc::clone(&self.mirror),
        ) {
            Ok(watcher) => *slot = Some(watcher),
            Err(e) => warn!(
                root = %root.display(),
                error = %e,
                "cannot watch directory, changes will not be followed"
            ),
        }
    }

    fn set_state(&self, next: EngineState) {
        let mut state = self.state.lock();
        let previous = *state;
        if previous != next {
            info!(from = %previous, to = %next, "engine state");
            *state = next;
        }
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.state() == EngineState::Stopped {
            return Err(EngineError::Stopped);
        }
        Ok(())
    }

    /// Paths of images filed under `category`, with scored fallback.
    pub async fn get_images_by_ratio(
        &self,
        category: RatioCategory,
    ) -> Result<Vec<PathBuf>, EngineError> {
        self.ensure_running()?;
        Ok(self.query.images_by_category(category).await)
    }

    /// Images for a client screen size, with the category it maps to.
    pub async fn get_images_for_resolution(
        &self,
        width: f64,
        height: f64,
    ) -> Result<(RatioCategory, Vec<PathBuf>), EngineError> {
        let category = classify_requested_resolution(width, height);
        let images = self.get_images_by_ratio(category).await?;
        Ok((category, images))
    }

    /// Pick one image at random, retrying against `widescreen` if the
    /// requested category has nothing at all.
    pub async fn pick(&self, requested: RatioCategory) -> Result<Option<Selection>, EngineError> {
        let mut served = requested;
        let mut candidates = self.get_images_by_ratio(requested).await?;
        if candidates.is_empty() && requested != RatioCategory::Widescreen {
            info!(requested = %requested, "no candidates, falling back to widescreen");
            served = RatioCategory::Widescreen;
            candidates = self.get_images_by_ratio(served).await?;
        }
        Ok(candidates.choose(&mut rand::rng()).map(|path| Selection {
            path: path.clone(),
            requested,
            served,
            candidates: candidates.len(),
        }))
    }

    /// Index size per category, from the store or else the mirror.
    pub fn get_statistics(&self) -> Result<Statistics, EngineError> {
        self.ensure_running()?;
        match self.store.category_counts() {
            Ok(counts) => Ok(Statistics::from_counts(counts, StatsSource::Store)),
            Err(e) => {
                warn!(error = %e, "store statistics unavailable, using memory");
                Ok(Statistics::from_counts(
                    self.mirror.category_counts(),
                    StatsSource::Memory,
                ))
            }
        }
    }

    /// Throw the index away and rebuild it from the files on disk.
    ///
    /// Pending events are dropped; the event being processed finishes first
    /// and is then wiped with everything else. Returns the number of files
    /// queued for indexing.
    pub async fn force_reanalyze(&self) -> Result<usize, EngineError> {
        let _exclusive = self.reanalysis.lock().await;
        self.ensure_running()?;
        let previous = self.state();
        self.set_state(EngineState::Reanalyzing);
        info!("reanalyzing all images");

        let dropped = self.queue.clear();
        self.queue.push(IndexEvent::Reset);

        let root = self.config.wallpaper_dir.clone();
        let root_exists = root.is_dir();
        let result = if root_exists {
            // A root that appeared after startup has never been watched.
            self.ensure_watching(&root);
            match self.walk(&root).await {
                Ok(files) => {
                    let count = files.len();
                    for file in files {
                        self.queue.push(IndexEvent::Changed(file));
                    }
                    Ok(count)
                }
                Err(e) => Err(e),
            }
        } else {
            warn!(root = %root.display(), "wallpaper directory not found, index cleared");
            Ok(0)
        };
        self.queue.wait_idle().await;

        let next = if root_exists {
            EngineState::Watching
        } else {
            previous
        };
        {
            let mut state = self.state.lock();
            if *state == EngineState::Reanalyzing {
                *state = next;
            }
        }
        if let Ok(count) = result {
            info!(files = count, dropped, indexed = self.mirror.len(), "reanalysis complete");
        }
        result
    }

    /// Queue removal of every indexed file that no longer exists.
    ///
    /// Returns how many were found. The removals are applied by the worker;
    /// call [`wait_idle`](Self::wait_idle) to observe them.
    pub async fn cleanup(&self) -> Result<usize, EngineError> {
        self.ensure_running()?;
        let removed = self.query.sweep_missing().await;
        if removed > 0 {
            info!(removed, "cleaned up missing files");
        }
        Ok(removed)
    }

    /// Resolve once every queued event has been applied.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    /// Stop watching, finish queued work, flush pending writes.
    ///
    /// A second call does nothing.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        info!("shutting down");
        drop(self.watcher.lock().take());
        self.queue.close();
        let joined = worker.await;
        self.set_state(EngineState::Stopped);
        if let Err(e) = &joined {
            error!(error = %e, "indexing worker failed");
        }
        joined?;
        Ok(())
    }
}
