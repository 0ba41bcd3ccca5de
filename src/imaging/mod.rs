//! Image measurement — pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Ratio math** | pure functions in `calculations` |
//!
//! The module is split into:
//! - **Calculations**: rounding, the two threshold tables and match scoring (unit testable)
//! - **Backend**: [`MetadataExtractor`] trait + [`ImageCrateExtractor`]

pub mod backend;
mod calculations;
pub mod rust_backend;

pub use backend::{ExtractionError, MetadataExtractor, PixelInfo};
pub use calculations::{
    aspect_ratio, classify_measured_ratio, classify_requested_ratio, match_score, round_ratio,
};
pub use rust_backend::ImageCrateExtractor;
