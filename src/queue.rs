//! Pending-event queue between the change watcher and the indexing worker.
//!
//! Many producers (the watcher thread, startup replay, reanalysis, queries
//! that find a file missing) push; exactly one consumer, the indexing worker,
//! pops. Events for one path are processed in the order they were pushed.
//!
//! ## Coalescing
//!
//! Editors and copy tools emit bursts of modify events for one file. A push
//! is dropped when the most recent pending entry for the same path has the
//! same kind, so a burst collapses to one entry while a distinct sequence
//! survives intact:
//!
//! ```text
//! push Changed(a)  push Changed(a)  push Deleted(a)  push Changed(a)
//! queue: [Changed(a)]  (dropped)    [.., Deleted(a)] [.., Changed(a)]
//! ```
//!
//! ## Outstanding work
//!
//! The queue counts events that are queued *or* being processed. The worker
//! calls [`PendingQueue::complete`] after each popped event, and
//! [`PendingQueue::wait_idle`] resolves once the count reaches zero.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tokio::sync::{Notify, watch};

/// A unit of indexing work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexEvent {
    /// The file may have been created or modified. Missing files are deleted.
    Changed(PathBuf),
    /// The file is gone.
    Deleted(PathBuf),
    /// Drop the whole index before the events queued after this one.
    Reset,
}

impl IndexEvent {
    pub fn path(&self) -> Option<&Path> {
        match self {
            IndexEvent::Changed(p) | IndexEvent::Deleted(p) => Some(p),
            IndexEvent::Reset => None,
        }
    }

    fn is_same_kind(&self, other: &IndexEvent) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// What happened to a pushed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// An identical entry for the same path is already the latest pending one.
    Coalesced,
    /// The queue has been closed for shutdown.
    Closed,
}

/// Latest pending entry for a path, and how many entries it has queued.
struct PathTail {
    last: IndexEvent,
    pending: usize,
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<IndexEvent>,
    tails: HashMap<PathBuf, PathTail>,
    closed: bool,
}

impl QueueState {
    fn forget(&mut self, event: &IndexEvent) {
        if let Some(path) = event.path()
            && let Some(tail) = self.tails.get_mut(path)
        {
            tail.pending -= 1;
            if tail.pending == 0 {
                self.tails.remove(path);
            }
        }
    }
}

/// Multi-producer, single-consumer queue of [`IndexEvent`]s.
pub struct PendingQueue {
    state: Mutex<QueueState>,
    wake: Notify,
    outstanding: watch::Sender<usize>,
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingQueue {
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            outstanding,
        }
    }

    /// Enqueue an event for the worker.
    pub fn push(&self, event: IndexEvent) -> PushOutcome {
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.closed {
                return PushOutcome::Closed;
            }
            if let Some(path) = event.path() {
                match state.tails.get_mut(path) {
                    Some(tail) if tail.last.is_same_kind(&event) => {
                        return PushOutcome::Coalesced;
                    }
                    Some(tail) => {
                        tail.last = event.clone();
                        tail.pending += 1;
                    }
                    None => {
                        state.tails.insert(
                            path.to_path_buf(),
                            PathTail {
                                last: event.clone(),
                                pending: 1,
                            },
                        );
                    }
                }
            }
            state.events.push_back(event);
            self.outstanding.send_modify(|n| *n += 1);
        }
        self.wake.notify_one();
        PushOutcome::Queued
    }

    /// Wait for the next event. `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<IndexEvent> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(event) = state.events.pop_front() {
                    state.forget(&event);
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            self.wake.notified().await;
        }
    }

    /// Mark one popped event as fully processed.
    pub fn complete(&self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Drop every queued event. The one being processed, if any, is unaffected.
    ///
    /// Returns the number of events dropped.
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut state = self.state.lock();
            let dropped = state.events.len();
            state.events.clear();
            state.tails.clear();
            dropped
        };
        if dropped > 0 {
            self.outstanding.send_modify(|n| *n = n.saturating_sub(dropped));
        }
        dropped
    }

    /// Refuse further pushes and let the worker finish what is queued.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.wake.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Events waiting to be popped.
    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().events.is_empty()
    }

    /// Events queued plus events being processed.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolve once nothing is queued or being processed.
    pub async fn wait_idle(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}
