//! Directory walking and path filtering.
//!
//! Decides which paths under the wallpaper root are indexed, and lists them.
//! The same [`ScanFilter`] is applied to the startup walk, to reanalysis and
//! to every watcher event, so a file is either tracked everywhere or nowhere.
//!
//! ## What is indexed
//!
//! ```text
//! wallpaper/
//! ├── a_3440x1440.jpg        # indexed
//! ├── b.PNG                  # indexed (extensions are case-insensitive)
//! ├── notes.txt              # skipped: extension
//! ├── .thumbs.jpg            # skipped: dotfile
//! ├── .cache/                # skipped with everything below it
//! │   └── x.jpg
//! └── nature/
//!     └── lake.webp          # indexed (walk is recursive)
//! ```
//!
//! Hidden entries are indexed only with `include_hidden = true`.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Extension and visibility rules for indexable files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFilter {
    /// Lowercase, without the leading dot.
    extensions: Vec<String>,
    include_hidden: bool,
}

impl ScanFilter {
    pub fn new(extensions: &[String], include_hidden: bool) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            include_hidden,
        }
    }

    /// True if the file name carries one of the configured extensions.
    pub fn has_indexable_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| *allowed == ext))
    }

    /// True if any component of `path` below `root` is a dot-name.
    pub fn is_hidden(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        relative.components().any(|c| match c {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        })
    }

    /// Whether `path` should be tracked, judged by name alone.
    ///
    /// The file itself is not consulted, so this also works for paths that
    /// no longer exist (deletion events).
    pub fn is_indexable(&self, root: &Path, path: &Path) -> bool {
        self.has_indexable_extension(path) && (self.include_hidden || !self.is_hidden(root, path))
    }

    /// Whether a directory below `root` should be descended into.
    pub fn enters_directory(&self, root: &Path, dir: &Path) -> bool {
        self.include_hidden || !self.is_hidden(root, dir)
    }
}

/// List every indexable file under `root`, sorted by path.
///
/// Entries that cannot be read are logged and skipped; only an unusable root
/// is an error.
pub fn scan_tree(root: &Path, filter: &ScanFilter) -> Result<Vec<PathBuf>, ScanError> {
    let meta = std::fs::metadata(root)?;
    if !meta.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || filter.enters_directory(root, entry.path())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry during scan");
                continue;
            }
        };
        if entry.file_type().is_file() && filter.is_indexable(root, entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}
