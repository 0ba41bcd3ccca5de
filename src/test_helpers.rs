//! Shared test utilities for the ratio-cache test suite.
//!
//! Provides record builders, real image fixtures, a failure-injecting store
//! and a ready-to-use engine config.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_png(&tmp.path().join("b.jpg"), 192, 108);
//!
//! let store = FlakyStore::new();
//! store.upsert(&record("/w/a.jpg", 2.39, RatioCategory::Ultrawide)).unwrap();
//! store.set_failing(true);
//! assert!(store.scan_all().is_err());
//! ```

use crate::config::EngineConfig;
use crate::store::{IndexStore, SqliteStore, StoreError};
use crate::types::{ClassificationSource, ImageRecord, RatioCategory, file_name_of};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

// =========================================================================
// Records
// =========================================================================

/// A stored-looking record with fixed file stats.
pub fn record(path: impl Into<PathBuf>, aspect_ratio: f64, category: RatioCategory) -> ImageRecord {
    let path = path.into();
    ImageRecord {
        file_name: file_name_of(&path),
        path,
        dimensions: None,
        aspect_ratio,
        category,
        format: None,
        file_size: 1024,
        modified_ms: 1_700_000_000_000,
        source: ClassificationSource::PixelMetadata,
    }
}

// =========================================================================
// Image fixtures
// =========================================================================

/// Write a black PNG of the given size, whatever the file extension says.
///
/// The extractor sniffs content, so `b.jpg` holding PNG bytes still measures.
pub fn write_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let img = image::RgbImage::new(width, height);
    let file = std::fs::File::create(path).unwrap();
    let mut writer = std::io::BufWriter::new(file);
    img.write_to(&mut writer, image::ImageFormat::Png).unwrap();
}

/// Write bytes that no decoder accepts.
pub fn write_garbage(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"definitely not an image").unwrap();
}

/// Config rooted at `root` with an in-tree database and the watcher off.
pub fn test_config(root: &Path) -> EngineConfig {
    EngineConfig {
        wallpaper_dir: root.to_path_buf(),
        database: root.join(".ratio-cache/index.db"),
        watcher: crate::config::WatcherConfig { enabled: false },
        ..EngineConfig::default()
    }
}

// =========================================================================
// Failure-injecting store
// =========================================================================

/// In-memory SQLite store that can be switched into a failing state.
///
/// While failing, every operation returns [`StoreError::Unavailable`] and
/// leaves the underlying data untouched.
pub struct FlakyStore {
    inner: SqliteStore,
    failing: AtomicBool,
    rejected: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            failing: AtomicBool::new(false),
            rejected: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of operations refused while failing.
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    /// The healthy store underneath, bypassing the failure switch.
    pub fn inner(&self) -> &SqliteStore {
        &self.inner
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

impl IndexStore for FlakyStore {
    fn upsert(&self, record: &ImageRecord) -> Result<(), StoreError> {
        self.check()?;
        self.inner.upsert(record)
    }

    fn delete(&self, path: &Path) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.delete(path)
    }

    fn get(&self, path: &Path) -> Result<Option<ImageRecord>, StoreError> {
        self.check()?;
        self.inner.get(path)
    }

    fn scan_by_category(&self, category: RatioCategory) -> Result<Vec<ImageRecord>, StoreError> {
        self.check()?;
        self.inner.scan_by_category(category)
    }

    fn scan_all(&self) -> Result<Vec<ImageRecord>, StoreError> {
        self.check()?;
        self.inner.scan_all()
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.check()?;
        self.inner.clear()
    }

    fn category_counts(&self) -> Result<BTreeMap<RatioCategory, usize>, StoreError> {
        self.check()?;
        self.inner.category_counts()
    }
}
