//! Aspect-ratio resolution for a single file.
//!
//! A file's ratio can come from three independent sources, and the first one
//! that answers wins:
//!
//! ```text
//! 1. filename resolution   wallpaper_1920x1080.jpg   → 1.78  (no I/O)
//! 2. filename keyword      ultrawide_forest.jpg      → 2.39  (no I/O)
//! 3. pixel metadata        header says 2560×1440     → 1.78  (opens the file)
//! 4. fallback default      header unreadable         → 1.78, widescreen
//! ```
//!
//! The filename rules run first because they cost nothing, and because a
//! name that spells out a resolution is a deliberate statement by whoever
//! curated the collection. When a name and the pixels disagree the name
//! wins; the file is never opened.
//!
//! A file that cannot be decoded is still indexed under the default so it
//! does not vanish from listings. Its generic ratio keeps it out of the
//! close-match tiers of other categories.

use crate::imaging::{MetadataExtractor, aspect_ratio, classify_measured_ratio};
use crate::naming::guess_from_filename;
use crate::types::{ClassificationSource, Dimensions, ImageRecord, RatioCategory, file_name_of};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Category given to files whose dimensions cannot be read.
pub const FALLBACK_CATEGORY: RatioCategory = RatioCategory::Widescreen;

/// Outcome of classifying one file, before file stats are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: RatioCategory,
    pub aspect_ratio: f64,
    pub dimensions: Option<Dimensions>,
    pub format: Option<String>,
    pub source: ClassificationSource,
}

impl Classification {
    pub fn fallback() -> Self {
        Self {
            category: FALLBACK_CATEGORY,
            aspect_ratio: FALLBACK_CATEGORY.canonical_ratio(),
            dimensions: None,
            format: None,
            source: ClassificationSource::FallbackDefault,
        }
    }

    /// Attach identity and file stats to produce a storable record.
    pub fn into_record(self, path: PathBuf, file_size: u64, modified_ms: i64) -> ImageRecord {
        ImageRecord {
            file_name: file_name_of(&path),
            path,
            dimensions: self.dimensions,
            aspect_ratio: self.aspect_ratio,
            category: self.category,
            format: self.format,
            file_size,
            modified_ms,
            source: self.source,
        }
    }
}

/// Classify from the filename only. `None` means the file must be measured.
fn classify_by_name(path: &Path) -> Option<Classification> {
    guess_from_filename(&file_name_of(path)).map(|guess| Classification {
        category: guess.category,
        aspect_ratio: guess.aspect_ratio,
        dimensions: guess.dimensions,
        format: None,
        source: guess.source,
    })
}

/// Classify by reading the image header, falling back to the default on failure.
fn classify_by_pixels(path: &Path, extractor: &dyn MetadataExtractor) -> Classification {
    let info = match extractor.extract(path) {
        Ok(info) => info,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "metadata extraction failed, using default ratio");
            return Classification::fallback();
        }
    };
    let Some(ratio) = aspect_ratio(info.dimensions.width, info.dimensions.height) else {
        warn!(path = %path.display(), "image reports zero height, using default ratio");
        return Classification::fallback();
    };
    Classification {
        // Classify the rounded ratio so the stored category is always
        // derivable from the stored ratio.
        category: classify_measured_ratio(ratio),
        aspect_ratio: ratio,
        dimensions: Some(info.dimensions),
        format: info.format,
        source: ClassificationSource::PixelMetadata,
    }
}

/// Run the full resolution chain for one file.
pub fn classify_file(path: &Path, extractor: &dyn MetadataExtractor) -> Classification {
    if let Some(by_name) = classify_by_name(path) {
        debug!(path = %path.display(), source = %by_name.source, "classified from filename");
        return by_name;
    }
    classify_by_pixels(path, extractor)
}
