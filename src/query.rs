//! Ratio queries over the index.
//!
//! ## Lookup order
//!
//! ```text
//! images_by_category(target)
//!   1. store.scan_by_category(target)
//!        rows found   → drop paths missing on disk (and queue their deletion)
//!                     → return the survivors
//!        no rows      → step 2
//!        store error  → step 2
//!   2. scored search over the memory mirror
//! ```
//!
//! ## Scored search
//!
//! Every mirrored record is placed in at most one tier:
//!
//! | Tier | Rule |
//! |---|---|
//! | exact | `record.category == target` |
//! | close | score ≥ 70 |
//! | fallback | 40 ≤ score < 70 |
//!
//! where `score = max(0, 100 − 30 × |ratio − canonical(target)|)`. A record
//! of another category that still scores exactly 100 matches by ratio but
//! not by category, and is left out. Only the best populated tier is
//! returned, highest score first.
//!
//! The exact tier is only reachable when the store is down: otherwise an
//! exact match would have been found in step 1.
//!
//! Queries never write. Stale entries they discover are queued as
//! [`IndexEvent::Deleted`] for the indexing worker.

use crate::cache::MemoryMirror;
use crate::imaging::{classify_requested_ratio, match_score};
use crate::queue::{IndexEvent, PendingQueue};
use crate::store::IndexStore;
use crate::types::{ImageRecord, RatioCategory};
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

const CLOSE_SCORE: f64 = 70.0;
const FALLBACK_SCORE: f64 = 40.0;
const PERFECT_SCORE: f64 = 100.0;

static MOBILE_UA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"mobile|android|iphone|ipad|phone|tablet").expect("valid pattern"));
static ULTRAWIDE_UA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ultrawide|3440x1440|2560x1080").expect("valid pattern"));

/// How well a scored candidate matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Exact,
    Close,
    Fallback,
}

/// A candidate from the scored search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMatch {
    pub path: PathBuf,
    pub aspect_ratio: f64,
    pub score: f64,
    pub tier: MatchTier,
}

/// Rank records against a target category.
///
/// Pure: no I/O, no existence checks.
pub fn scored_matches(records: &[ImageRecord], target: RatioCategory) -> Vec<ScoredMatch> {
    let canonical = target.canonical_ratio();
    let mut matches: Vec<ScoredMatch> = records
        .iter()
        .filter_map(|record| {
            let (score, tier) = if record.category == target {
                (PERFECT_SCORE, MatchTier::Exact)
            } else {
                let score = match_score(record.aspect_ratio, canonical);
                if score >= PERFECT_SCORE {
                    return None;
                } else if score >= CLOSE_SCORE {
                    (score, MatchTier::Close)
                } else if score >= FALLBACK_SCORE {
                    (score, MatchTier::Fallback)
                } else {
                    return None;
                }
            };
            Some(ScoredMatch {
                path: record.path.clone(),
                aspect_ratio: record.aspect_ratio,
                score,
                tier,
            })
        })
        .collect();

    let Some(best) = matches.iter().map(|m| m.tier).min() else {
        return matches;
    };
    matches.retain(|m| m.tier == best);
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    matches
}

/// Category to serve for a client screen of `width` × `height`.
///
/// Non-finite or non-positive sizes get `widescreen`.
pub fn classify_requested_resolution(width: f64, height: f64) -> RatioCategory {
    if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
        warn!(width, height, "invalid screen resolution, serving widescreen");
        return RatioCategory::Widescreen;
    }
    classify_requested_ratio(width / height)
}

/// Guess a screen category from a `User-Agent` header.
///
/// Phones are portrait, iPads standard, anything advertising an ultrawide
/// resolution ultrawide, everything else widescreen.
pub fn classify_user_agent(user_agent: &str) -> RatioCategory {
    let ua = user_agent.to_lowercase();
    if MOBILE_UA.is_match(&ua) {
        if ua.contains("ipad") {
            return RatioCategory::Standard;
        }
        return RatioCategory::Portrait;
    }
    if ULTRAWIDE_UA.is_match(&ua) {
        return RatioCategory::Ultrawide;
    }
    RatioCategory::Widescreen
}

/// Answers ratio queries from the store, falling back to the mirror.
pub struct QueryEngine {
    store: Arc<dyn IndexStore>,
    mirror: Arc<MemoryMirror>,
    queue: Arc<PendingQueue>,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn IndexStore>,
        mirror: Arc<MemoryMirror>,
        queue: Arc<PendingQueue>,
    ) -> Self {
        Self {
            store,
            mirror,
            queue,
        }
    }

    /// Paths of images to serve for `category`.
    pub async fn images_by_category(&self, category: RatioCategory) -> Vec<PathBuf> {
        match self.store.scan_by_category(category) {
            Ok(records) if !records.is_empty() => {
                let mut survivors = Vec::with_capacity(records.len());
                for record in records {
                    if self.still_exists(&record.path).await {
                        survivors.push(record.path);
                    }
                }
                return survivors;
            }
            Ok(_) => {
                debug!(category = %category, "no stored records, using scored search");
            }
            Err(e) => {
                warn!(category = %category, error = %e, "store query failed, using scored search");
            }
        }
        self.memory_matches(category)
            .await
            .into_iter()
            .map(|m| m.path)
            .collect()
    }

    /// Scored search over the mirror, skipping files that have vanished.
    pub async fn memory_matches(&self, category: RatioCategory) -> Vec<ScoredMatch> {
        let mut live = Vec::new();
        for record in self.mirror.snapshot() {
            if self.still_exists(&record.path).await {
                live.push(record);
            }
        }
        scored_matches(&live, category)
    }

    /// Queue deletion of every mirrored record whose file is gone.
    ///
    /// Returns how many were found.
    pub async fn sweep_missing(&self) -> usize {
        let mut missing = 0;
        for path in self.mirror.snapshot().into_iter().map(|r| r.path) {
            if !self.still_exists(&path).await {
                missing += 1;
            }
        }
        missing
    }

    /// Check the file is on disk; queue its deletion if not.
    ///
    /// An unreadable path counts as present; only a definite absence heals.
    async fn still_exists(&self, path: &Path) -> bool {
        match tokio::fs::try_exists(path).await {
            Ok(true) => true,
            Ok(false) => {
                debug!(path = %path.display(), "indexed file missing, queueing removal");
                self.queue.push(IndexEvent::Deleted(path.to_path_buf()));
                false
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot check file, keeping it");
                true
            }
        }
    }
}
