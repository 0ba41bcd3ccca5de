//! Filename heuristics for aspect-ratio classification.
//!
//! Wallpaper collections are usually named by whoever downloaded them, and
//! the names often say what shape the image is. Reading that is free: no
//! file handle, no decoder. Two patterns are recognised, tried in order:
//!
//! ## Explicit resolution
//!
//! Two 3–5 digit numbers joined by `x`, `_` or `-`, each within 100–8000:
//! - `wallpaper_1920x1080.jpg` → 1920×1080, ratio 1.78, widescreen
//! - `city-3440_1440.png` → 3440×1440, ratio 2.39, ultrawide
//!
//! Only the first such pair in the name is considered. A date like
//! `20240101_1920x1080` makes the first pair `40101_1920`, which is out of
//! range, and the name falls through to the keyword rule.
//!
//! ## Ratio keywords
//!
//! Words or ratio notations that name a category, checked widest first:
//! - `ultrawide_forest.jpg`, `lake-21-9.png` → ultrawide
//! - `widescreen.jpg`, `beach_16_10.jpg` → widescreen
//! - `old_4-3_scan.jpg` → standard
//! - `vertical-city.png`, `mobile_9-16.jpg` → portrait
//! - `square_icon.png`, `avatar_1-1.jpg` → square
//!
//! A keyword match carries no measurement, so it is given the category's
//! canonical ratio.

use crate::imaging::{aspect_ratio, classify_measured_ratio};
use crate::types::{ClassificationSource, Dimensions, RatioCategory};
use regex::Regex;
use std::sync::LazyLock;

const MIN_NAMED_SIDE: u32 = 100;
const MAX_NAMED_SIDE: u32 = 8000;

static RESOLUTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{3,5})[x_\-](\d{3,5})").expect("resolution pattern is valid"));

static KEYWORDS: LazyLock<Vec<(RatioCategory, Regex)>> = LazyLock::new(|| {
    [
        (
            RatioCategory::Ultrawide,
            r"ultra-?wide|21[:\-_]9|3440x1440|2560x1080",
        ),
        (
            RatioCategory::Widescreen,
            r"wide-?screen|16[:\-_]9|16[:\-_]10|1920x1080|2560x1440",
        ),
        (
            RatioCategory::Standard,
            r"standard|4[:\-_]3|5[:\-_]4|1024x768|1280x1024",
        ),
        (
            RatioCategory::Portrait,
            r"portrait|vertical|mobile|9[:\-_]16|1080x1920",
        ),
        (RatioCategory::Square, r"square|1[:\-_]1|1080x1080"),
    ]
    .into_iter()
    .map(|(category, pattern)| {
        (
            category,
            Regex::new(pattern).expect("keyword pattern is valid"),
        )
    })
    .collect()
});

/// What a filename alone says about an image's shape.
#[derive(Debug, Clone, PartialEq)]
pub struct FilenameGuess {
    pub category: RatioCategory,
    /// Rounded to two decimals; canonical ratio for keyword matches.
    pub aspect_ratio: f64,
    /// Present only for explicit-resolution matches.
    pub dimensions: Option<Dimensions>,
    /// Either `FilenameResolution` or `FilenamePattern`.
    pub source: ClassificationSource,
}

/// Parse `WIDTH?HEIGHT` from a filename, if the first pair is in range.
pub fn parse_resolution(file_name: &str) -> Option<Dimensions> {
    let lower = file_name.to_lowercase();
    let caps = RESOLUTION.captures(&lower)?;
    let width: u32 = caps[1].parse().ok()?;
    let height: u32 = caps[2].parse().ok()?;
    let in_range = |v: u32| (MIN_NAMED_SIDE..=MAX_NAMED_SIDE).contains(&v);
    if in_range(width) && in_range(height) {
        Some(Dimensions { width, height })
    } else {
        None
    }
}

/// Find the first ratio keyword in a filename.
pub fn match_keyword(file_name: &str) -> Option<RatioCategory> {
    let lower = file_name.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&lower))
        .map(|(category, _)| *category)
}

/// Classify a filename without touching the file.
///
/// Explicit resolution wins over keywords: `ultrawide_1920x1080.jpg` is
/// widescreen, because the numbers are a measurement and the word is a label.
pub fn guess_from_filename(file_name: &str) -> Option<FilenameGuess> {
    if let Some(dims) = parse_resolution(file_name)
        && let Some(ratio) = aspect_ratio(dims.width, dims.height)
    {
        return Some(FilenameGuess {
            category: classify_measured_ratio(ratio),
            aspect_ratio: ratio,
            dimensions: Some(dims),
            source: ClassificationSource::FilenameResolution,
        });
    }

    match_keyword(file_name).map(|category| FilenameGuess {
        category,
        aspect_ratio: category.canonical_ratio(),
        dimensions: None,
        source: ClassificationSource::FilenamePattern,
    })
}
