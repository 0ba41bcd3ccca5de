//! Metadata extraction trait and shared types.
//!
//! The [`MetadataExtractor`] trait is the single operation the indexer needs
//! from an image library: read the pixel size of a file. The production
//! implementation is [`ImageCrateExtractor`](super::rust_backend::ImageCrateExtractor),
//! which reads headers through the `image` crate without decoding pixels.

use crate::types::Dimensions;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Image reports a zero dimension: {0}x{1}")]
    ZeroDimension(u32, u32),
}

/// Result of reading an image header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelInfo {
    pub dimensions: Dimensions,
    /// Lowercase format name as guessed from the file content (`"jpeg"`, `"png"`, ...).
    pub format: Option<String>,
}

/// Reads pixel dimensions from image files.
///
/// Implementations must be callable from a blocking thread pool, hence
/// `Send + Sync`.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<PixelInfo, ExtractionError>;
}
