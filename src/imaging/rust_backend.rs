//! Header-only dimension reader built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Format sniffing | `image::ImageReader::with_guessed_format` (magic bytes, not extension) |
//! | Dimensions | `image::ImageReader::into_dimensions` (header only, no pixel decode) |
//!
//! Sniffing by content means a PNG saved as `.jpg` still gets measured
//! correctly, and a text file renamed to `.jpg` fails cleanly instead of
//! being trusted.

use super::backend::{ExtractionError, MetadataExtractor, PixelInfo};
use crate::types::Dimensions;
use image::{ImageFormat, ImageReader};
use std::path::Path;

/// Extractor backed by the `image` crate's pure-Rust decoders.
pub struct ImageCrateExtractor;

impl ImageCrateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageCrateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn format_name(format: ImageFormat) -> Option<String> {
    format.extensions_str().first().map(|ext| match *ext {
        "jpg" => "jpeg".to_string(),
        other => other.to_string(),
    })
}

impl MetadataExtractor for ImageCrateExtractor {
    fn extract(&self, path: &Path) -> Result<PixelInfo, ExtractionError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let format = reader.format().and_then(format_name);
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| ExtractionError::Decode(e.to_string()))?;
        if width == 0 || height == 0 {
            return Err(ExtractionError::ZeroDimension(width, height));
        }
        Ok(PixelInfo {
            dimensions: Dimensions { width, height },
            format,
        })
    }
}
