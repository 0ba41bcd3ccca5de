//! # Ratio Cache
//!
//! An aspect-ratio index for a directory of wallpapers. Every image under the
//! watched root is filed into one of five screen shapes (ultrawide,
//! widescreen, standard, portrait, square), the index is persisted in SQLite,
//! and "give me images for this screen" queries are answered with a tiered
//! fallback when no image fits exactly.
//!
//! # Architecture: One Writer, Many Readers
//!
//! ```text
//!  filesystem ──► watcher ──► queue ──► pipeline ──► store (SQLite)
//!                                            │
//!                                            └─────► mirror (memory)
//!                                                       │
//!  caller ◄──────────────── query ◄─────────────────────┘
//! ```
//!
//! A single worker task drains the queue and is the only code that writes the
//! store or the mirror. Queries read both concurrently. When a query runs into
//! a file that has vanished it does not delete anything itself; it queues a
//! deletion for the worker, so the two tiers never disagree about who wrote
//! last.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | [`CacheEngine`]: lifecycle, startup replay, public operations |
//! | [`pipeline`] | The indexing worker: classify, persist, update mirror, retry failed writes |
//! | [`queue`] | Coalescing event queue between producers and the worker |
//! | [`watcher`] | `notify` events mapped to queue events |
//! | [`query`] | Category lookup, scored fallback search, request classification |
//! | [`store`] | [`IndexStore`] trait and its SQLite implementation |
//! | [`cache`] | In-memory mirror of the store |
//! | [`metadata`] | Classification chain: filename first, then pixel dimensions |
//! | [`naming`] | Filename heuristics: `WxH` resolutions and shape keywords |
//! | [`imaging`] | Ratio math, category thresholds, header-only dimension reading |
//! | [`scan`] | Directory walk with extension and dotfile filtering |
//! | [`config`] | TOML config loading, merging and validation |
//! | [`types`] | [`ImageRecord`], [`RatioCategory`] and friends |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Filename Before Pixels
//!
//! A file called `forest_3440x1440.jpg` is classified without being opened.
//! Wallpaper collections are mostly downloaded with their resolution in the
//! name, so this skips the decoder for the bulk of a library and still files
//! correctly the images whose headers are damaged.
//!
//! ## Two Ratio Tables
//!
//! Indexing and request classification use separate threshold tables
//! ([`imaging::classify_measured_ratio`] and
//! [`imaging::classify_requested_ratio`]). They hold the same numbers today;
//! keeping them apart lets one move without silently re-filing the other.
//!
//! ## Best-Effort Consistency
//!
//! The index converges on the filesystem but never blocks a query to do so.
//! A store outage degrades to the mirror, a failed write is parked and
//! retried, a lost watcher event is repaired by the next query that touches
//! the path or by [`CacheEngine::cleanup`].

pub mod cache;
pub mod config;
pub mod engine;
pub mod imaging;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod query;
pub mod queue;
pub mod scan;
pub mod store;
pub mod types;
pub mod watcher;

pub use config::EngineConfig;
pub use engine::{CacheEngine, EngineError, EngineState, Selection, Statistics, StatsSource};
pub use store::{IndexStore, SqliteStore};
pub use types::{ClassificationSource, ImageRecord, RatioCategory};

#[cfg(test)]
pub(crate) mod test_helpers;
