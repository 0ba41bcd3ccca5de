//! CLI output formatting.
//!
//! Results are shown relative to the wallpaper root, so the same index reads
//! the same wherever the directory is mounted.
//!
//! # Output Format
//!
//! ## Index / statistics
//!
//! ```text
//! Indexed 42 images (store)
//!     ultrawide   3
//!     widescreen 30
//!     standard    5
//!     portrait    4
//!     square      0
//! ```
//!
//! ## Query
//!
//! ```text
//! widescreen: 3 images
//! 001 nature/lake.jpg
//! 002 city_2560x1440.png
//! 003 beach.webp
//! ```
//!
//! ## Pick
//!
//! ```text
//! nature/lake.jpg
//!     portrait → widescreen (no portrait images, 30 candidates)
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout.

use crate::engine::{Selection, Statistics, StatsSource};
use crate::types::RatioCategory;
use std::path::Path;

// ============================================================================
// Helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Display `path` relative to `root` when it lies under it.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Format index statistics: total with its source, then one line per category.
pub fn format_statistics(stats: &Statistics) -> Vec<String> {
    let source = match stats.source {
        StatsSource::Store => "store",
        StatsSource::Memory => "memory",
    };
    let mut lines = vec![format!(
        "Indexed {} ({})",
        plural(stats.total_images, "image"),
        source
    )];
    let width = stats
        .per_category
        .values()
        .map(|n| n.to_string().len())
        .max()
        .unwrap_or(1)
        .max(2);
    for category in RatioCategory::ALL {
        let count = stats.per_category.get(&category).copied().unwrap_or(0);
        lines.push(format!(
            "{}{:<11}{:>width$}",
            indent(1),
            category.as_str(),
            count,
            width = width
        ));
    }
    lines
}

pub fn print_statistics(stats: &Statistics) {
    for line in format_statistics(stats) {
        println!("{}", line);
    }
}

/// Statistics as pretty JSON, for `stats --json`.
pub fn statistics_json(stats: &Statistics) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(stats)
}

// ============================================================================
// Query
// ============================================================================

/// Format query results: a header with the count, then one numbered path per line.
pub fn format_query_results(
    category: RatioCategory,
    paths: &[impl AsRef<Path>],
    root: &Path,
) -> Vec<String> {
    let mut lines = vec![format!("{}: {}", category, plural(paths.len(), "image"))];
    for (i, path) in paths.iter().enumerate() {
        lines.push(format!(
            "{} {}",
            format_index(i + 1),
            display_path(path.as_ref(), root)
        ));
    }
    lines
}

pub fn print_query_results(category: RatioCategory, paths: &[impl AsRef<Path>], root: &Path) {
    for line in format_query_results(category, paths, root) {
        println!("{}", line);
    }
}

// ============================================================================
// Pick
// ============================================================================

/// Format a random pick. A fallback to another category is shown as context.
pub fn format_selection(
    selection: Option<&Selection>,
    requested: RatioCategory,
    root: &Path,
) -> Vec<String> {
    let Some(selection) = selection else {
        return vec![format!("No images available for {}", requested)];
    };
    let mut lines = vec![display_path(&selection.path, root)];
    if selection.is_fallback() {
        lines.push(format!(
            "{}{} → {} (no {} images, {})",
            indent(1),
            selection.requested,
            selection.served,
            selection.requested,
            plural(selection.candidates, "candidate")
        ));
    } else {
        lines.push(format!(
            "{}{} ({})",
            indent(1),
            selection.served,
            plural(selection.candidates, "candidate")
        ));
    }
    lines
}

pub fn print_selection(selection: Option<&Selection>, requested: RatioCategory, root: &Path) {
    for line in format_selection(selection, requested, root) {
        println!("{}", line);
    }
}

// ============================================================================
// Maintenance
// ============================================================================

pub fn format_reanalyze(queued: usize, stats: &Statistics) -> Vec<String> {
    let mut lines = vec![format!("Reanalyzed {}", plural(queued, "file"))];
    lines.extend(format_statistics(stats));
    lines
}

pub fn print_reanalyze(queued: usize, stats: &Statistics) {
    for line in format_reanalyze(queued, stats) {
        println!("{}", line);
    }
}

pub fn format_cleanup(removed: usize) -> Vec<String> {
    if removed == 0 {
        vec!["Index is clean".to_string()]
    } else {
        vec![format!("Removed {} no longer on disk", plural(removed, "image"))]
    }
}

pub fn print_cleanup(removed: usize) {
    for line in format_cleanup(removed) {
        println!("{}", line);
    }
}
