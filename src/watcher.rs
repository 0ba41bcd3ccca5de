//! Filesystem change watching.
//!
//! Turns `notify` events under the wallpaper root into [`IndexEvent`]s on the
//! pending queue. The watcher only decides *which* paths need attention; the
//! indexing worker decides what changed by looking at the file, so a lost or
//! misreported event kind costs at most one redundant stat.
//!
//! ## Event mapping
//!
//! | notify event | Path | Queued |
//! |---|---|---|
//! | Remove | indexable file | `Deleted(path)` |
//! | Remove | anything else | `Deleted` for each indexed file under it |
//! | Create / Modify / Rename | indexable file | `Changed(path)` |
//! | Create / Modify / Rename | existing directory | `Changed` for each indexable file under it |
//! | Create / Modify / Rename | vanished non-image path | `Deleted` for each indexed file under it |
//! | event with no paths | (rescan) | `Changed` for every indexable file under the root |
//! | Access | | nothing |

use crate::cache::MemoryMirror;
use crate::queue::{IndexEvent, PendingQueue};
use crate::scan::{ScanFilter, scan_tree};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Routes raw notify events to the pending queue.
pub(crate) struct EventRouter {
    root: PathBuf,
    filter: ScanFilter,
    queue: Arc<PendingQueue>,
    mirror: Arc<MemoryMirror>,
}

impl EventRouter {
    pub(crate) fn new(
        root: PathBuf,
        filter: ScanFilter,
        queue: Arc<PendingQueue>,
        mirror: Arc<MemoryMirror>,
    ) -> Self {
        Self {
            root,
            filter,
            queue,
            mirror,
        }
    }

    pub(crate) fn route(&self, event: Event) {
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }
        if event.paths.is_empty() {
            warn!("watcher requested a rescan");
            self.enqueue_tree(&self.root);
            return;
        }
        let removed = matches!(event.kind, EventKind::Remove(_));
        for path in event.paths {
            if removed {
                self.on_removed(&path);
            } else {
                self.on_touched(&path);
            }
        }
    }

    fn on_removed(&self, path: &Path) {
        if self.filter.is_indexable(&self.root, path) {
            self.queue.push(IndexEvent::Deleted(path.to_path_buf()));
        } else {
            self.prune_under(path);
        }
    }

    fn on_touched(&self, path: &Path) {
        if path.is_dir() {
            if self.filter.enters_directory(&self.root, path) {
                self.enqueue_tree(path);
            }
        } else if self.filter.is_indexable(&self.root, path) {
            self.queue.push(IndexEvent::Changed(path.to_path_buf()));
        } else if !path.exists() {
            // A directory renamed away arrives as a modify of a missing path.
            self.prune_under(path);
        }
    }

    fn enqueue_tree(&self, dir: &Path) {
        match scan_tree(dir, &self.filter) {
            Ok(files) => {
                debug!(dir = %dir.display(), files = files.len(), "queueing directory contents");
                for file in files {
                    if self.filter.is_indexable(&self.root, &file) {
                        self.queue.push(IndexEvent::Changed(file));
                    }
                }
            }
            Err(e) => warn!(dir = %dir.display(), error = %e, "cannot scan directory"),
        }
    }

    fn prune_under(&self, prefix: &Path) {
        for path in self.mirror.paths_under(prefix) {
            self.queue.push(IndexEvent::Deleted(path));
        }
    }
}

/// Live watch on the wallpaper root. Watching stops when this is dropped.
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl ChangeWatcher {
    /// Start watching `root` recursively.
    pub fn start(
        root: &Path,
        filter: ScanFilter,
        queue: Arc<PendingQueue>,
        mirror: Arc<MemoryMirror>,
    ) -> Result<Self, WatchError> {
        let router = EventRouter::new(root.to_path_buf(), filter, queue, mirror);
        let mut watcher =
            recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => router.route(event),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        info!(root = %root.display(), "watching for changes");
        Ok(Self {
            _watcher: watcher,
            root: root.to_path_buf(),
        })
    }
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("root", &self.root)
            .finish()
    }
}
