//! Pure calculation functions for aspect ratios.
//!
//! All functions here are pure and testable without any I/O or images.
//!
//! Two threshold tables live here and are kept apart on purpose: one files
//! indexed images into categories, the other maps a requested screen size to
//! the category to serve. They currently hold the same cut points, but they
//! answer different questions and are tuned independently.
//!
//! Indexing used to cut at 2.35 / 1.65 / 1.15 / 0.8. It now uses the request
//! table's 2.3 / 1.7 / 1.2 / 0.5 so an image and the screen asking for it land
//! in the same category; `index_follows_request_cut_points` pins this.

use crate::types::RatioCategory;

/// Lower bounds for classifying an indexed image's measured ratio.
///
/// Checked top to bottom; the first bound the ratio reaches wins. Anything
/// below the last bound is `square`.
const INDEX_THRESHOLDS: [(f64, RatioCategory); 4] = [
    (2.3, RatioCategory::Ultrawide),
    (1.7, RatioCategory::Widescreen),
    (1.2, RatioCategory::Standard),
    (0.5, RatioCategory::Portrait),
];

/// Lower bounds for classifying a requested screen resolution.
const REQUEST_THRESHOLDS: [(f64, RatioCategory); 4] = [
    (2.3, RatioCategory::Ultrawide),
    (1.7, RatioCategory::Widescreen),
    (1.2, RatioCategory::Standard),
    (0.5, RatioCategory::Portrait),
];

/// Points lost per unit of ratio difference when scoring a near match.
const SCORE_PER_RATIO_UNIT: f64 = 30.0;

fn classify_with(table: &[(f64, RatioCategory)], ratio: f64) -> RatioCategory {
    table
        .iter()
        .find(|(min, _)| ratio >= *min)
        .map(|(_, category)| *category)
        .unwrap_or(RatioCategory::Square)
}

/// Round a ratio to two decimal places.
///
/// ```
/// # use ratio_cache::imaging::round_ratio;
/// assert_eq!(round_ratio(1920.0 / 1080.0), 1.78);
/// assert_eq!(round_ratio(3440.0 / 1440.0), 2.39);
/// ```
pub fn round_ratio(ratio: f64) -> f64 {
    (ratio * 100.0).round() / 100.0
}

/// Width / height rounded to two decimals, or `None` for a zero height.
pub fn aspect_ratio(width: u32, height: u32) -> Option<f64> {
    if height == 0 {
        return None;
    }
    Some(round_ratio(width as f64 / height as f64))
}

/// Category for an indexed image's measured ratio.
///
/// | Ratio | Category |
/// |---|---|
/// | ≥ 2.3 | ultrawide |
/// | [1.7, 2.3) | widescreen |
/// | [1.2, 1.7) | standard |
/// | [0.5, 1.2) | portrait |
/// | < 0.5 | square |
pub fn classify_measured_ratio(ratio: f64) -> RatioCategory {
    classify_with(&INDEX_THRESHOLDS, ratio)
}

/// Category for a requested screen ratio (width / height of the client).
pub fn classify_requested_ratio(ratio: f64) -> RatioCategory {
    classify_with(&REQUEST_THRESHOLDS, ratio)
}

/// Closeness of an image ratio to a target ratio, from 0 to 100.
///
/// `score = max(0, 100 − 30 × |ratio − target|)`; an exact match scores 100.
pub fn match_score(ratio: f64, target: f64) -> f64 {
    let difference = (ratio - target).abs();
    (100.0 - difference * SCORE_PER_RATIO_UNIT).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Rounding
    // =========================================================================

    #[test]
    fn round_ratio_two_decimals() {
        assert_eq!(round_ratio(1.777_777), 1.78);
        assert_eq!(round_ratio(0.5625), 0.56);
        assert_eq!(round_ratio(1.0), 1.0);
    }

    #[test]
    fn aspect_ratio_common_resolutions() {
        assert_eq!(aspect_ratio(1920, 1080), Some(1.78));
        assert_eq!(aspect_ratio(2560, 1080), Some(2.37));
        assert_eq!(aspect_ratio(1024, 768), Some(1.33));
        assert_eq!(aspect_ratio(1080, 1920), Some(0.56));
    }

    #[test]
    fn aspect_ratio_zero_height_is_none() {
        assert_eq!(aspect_ratio(1920, 0), None);
    }

    // =========================================================================
    // Index thresholds
    // =========================================================================

    #[test]
    fn index_boundaries_fall_into_upper_category() {
        assert_eq!(classify_measured_ratio(2.3), RatioCategory::Ultrawide);
        assert_eq!(classify_measured_ratio(1.7), RatioCategory::Widescreen);
        assert_eq!(classify_measured_ratio(1.2), RatioCategory::Standard);
        assert_eq!(classify_measured_ratio(0.5), RatioCategory::Portrait);
        assert_eq!(classify_measured_ratio(0.49), RatioCategory::Square);
    }

    #[test]
    fn index_follows_request_cut_points() {
        // Each of these sat in the neighbouring category under the old cuts.
        for ratio in [2.33, 1.67, 1.17, 0.6] {
            assert_eq!(
                classify_measured_ratio(ratio),
                classify_requested_ratio(ratio),
                "ratio {ratio}"
            );
        }
        assert_eq!(classify_measured_ratio(2.33), RatioCategory::Ultrawide);
        assert_eq!(classify_measured_ratio(1.67), RatioCategory::Standard);
        assert_eq!(classify_measured_ratio(1.17), RatioCategory::Portrait);
        assert_eq!(classify_measured_ratio(0.6), RatioCategory::Portrait);
    }

    #[test]
    fn index_just_below_boundaries() {
        assert_eq!(classify_measured_ratio(2.29), RatioCategory::Widescreen);
        assert_eq!(classify_measured_ratio(1.69), RatioCategory::Standard);
        assert_eq!(classify_measured_ratio(1.19), RatioCategory::Portrait);
    }

    #[test]
    fn index_extremes() {
        assert_eq!(classify_measured_ratio(32.0), RatioCategory::Ultrawide);
        assert_eq!(classify_measured_ratio(0.0), RatioCategory::Square);
    }

    #[test]
    fn square_canonical_ratio_measures_as_portrait() {
        // A 1:1 image measures into the portrait band; only the keyword
        // rule files images as square.
        assert_eq!(classify_measured_ratio(1.0), RatioCategory::Portrait);
    }

    // =========================================================================
    // Request thresholds
    // =========================================================================

    #[test]
    fn request_boundaries() {
        assert_eq!(classify_requested_ratio(2.3), RatioCategory::Ultrawide);
        assert_eq!(classify_requested_ratio(1.7), RatioCategory::Widescreen);
        assert_eq!(classify_requested_ratio(1.2), RatioCategory::Standard);
        assert_eq!(classify_requested_ratio(0.5), RatioCategory::Portrait);
        assert_eq!(classify_requested_ratio(0.49), RatioCategory::Square);
    }

    #[test]
    fn request_common_screens() {
        assert_eq!(classify_requested_ratio(3440.0 / 1440.0), RatioCategory::Ultrawide);
        assert_eq!(classify_requested_ratio(1920.0 / 1080.0), RatioCategory::Widescreen);
        assert_eq!(classify_requested_ratio(1920.0 / 1200.0), RatioCategory::Standard);
        assert_eq!(classify_requested_ratio(1080.0 / 1920.0), RatioCategory::Portrait);
    }

    // =========================================================================
    // Scoring
    // =========================================================================

    #[test]
    fn match_score_exact_is_100() {
        assert_eq!(match_score(1.78, 1.78), 100.0);
    }

    #[test]
    fn match_score_is_symmetric() {
        assert_eq!(match_score(1.0, 2.0), match_score(2.0, 1.0));
    }

    #[test]
    fn match_score_linear_falloff() {
        assert!((match_score(1.5, 1.0) - 85.0).abs() < 1e-9);
        assert!((match_score(2.0, 1.0) - 70.0).abs() < 1e-9);
    }

    #[test]
    fn match_score_floors_at_zero() {
        assert_eq!(match_score(10.0, 1.0), 0.0);
    }
}
