//! Shared types used across the indexing pipeline, the store and the query engine.
//!
//! [`ImageRecord`] is the unit that flows through every stage: the pipeline
//! produces it, the store persists it, the mirror keeps a copy and the query
//! engine ranks it. The same struct is used everywhere so a record read back
//! from SQLite is indistinguishable from one freshly classified.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Screen-shape bucket an image is filed under.
///
/// The set is closed: every record carries exactly one of these, and every
/// query targets one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatioCategory {
    Ultrawide,
    Widescreen,
    Standard,
    Portrait,
    Square,
}

impl RatioCategory {
    /// All categories, widest first.
    pub const ALL: [RatioCategory; 5] = [
        RatioCategory::Ultrawide,
        RatioCategory::Widescreen,
        RatioCategory::Standard,
        RatioCategory::Portrait,
        RatioCategory::Square,
    ];

    /// Representative ratio used for scoring and for keyword-classified files.
    ///
    /// | Category | Ratio |
    /// |---|---|
    /// | ultrawide | 2.39 |
    /// | widescreen | 1.78 |
    /// | standard | 1.33 |
    /// | portrait | 0.56 |
    /// | square | 1.00 |
    pub fn canonical_ratio(self) -> f64 {
        match self {
            RatioCategory::Ultrawide => 2.39,
            RatioCategory::Widescreen => 1.78,
            RatioCategory::Standard => 1.33,
            RatioCategory::Portrait => 0.56,
            RatioCategory::Square => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RatioCategory::Ultrawide => "ultrawide",
            RatioCategory::Widescreen => "widescreen",
            RatioCategory::Standard => "standard",
            RatioCategory::Portrait => "portrait",
            RatioCategory::Square => "square",
        }
    }
}

impl fmt::Display for RatioCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown ratio category '{}' (expected one of: ultrawide, widescreen, standard, portrait, square)",
            self.0
        )
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for RatioCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RatioCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Which heuristic produced a record's ratio.
///
/// Ordered from cheapest to most expensive signal, with the failure
/// default last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassificationSource {
    /// `WIDTHxHEIGHT` found in the filename.
    FilenameResolution,
    /// Ratio keyword (`ultrawide`, `16-9`, `portrait`, ...) found in the filename.
    FilenamePattern,
    /// Dimensions decoded from the file header.
    PixelMetadata,
    /// Decoding failed; filed as widescreen so the file stays listed.
    FallbackDefault,
}

impl ClassificationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassificationSource::FilenameResolution => "filename-resolution",
            ClassificationSource::FilenamePattern => "filename-pattern",
            ClassificationSource::PixelMetadata => "pixel-metadata",
            ClassificationSource::FallbackDefault => "fallback-default",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "filename-resolution" => Some(ClassificationSource::FilenameResolution),
            "filename-pattern" => Some(ClassificationSource::FilenamePattern),
            "pixel-metadata" => Some(ClassificationSource::PixelMetadata),
            "fallback-default" => Some(ClassificationSource::FallbackDefault),
            _ => None,
        }
    }
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// One indexed image file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    /// Width / height, rounded to two decimals.
    pub aspect_ratio: f64,
    pub category: RatioCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub file_size: u64,
    /// On-disk modification time in milliseconds since the Unix epoch.
    pub modified_ms: i64,
    pub source: ClassificationSource,
}

impl ImageRecord {
    /// True if the file's current modification time differs from the indexed one.
    pub fn is_stale(&self, modified_ms: i64) -> bool {
        self.modified_ms != modified_ms
    }
}

/// Final path component as a display string.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Convert a filesystem timestamp to epoch milliseconds.
///
/// Times before the epoch come out negative rather than failing.
pub fn system_time_ms(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}
