//! Frame data structures for captured screen content

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::Path;
use std::time::Instant;

/// A captured snapshot of the watched screen region
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGB pixel grid
    image: RgbImage,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Wrap an already decoded RGB image
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            timestamp: Instant::now(),
        }
    }

    /// Load a frame from an image file on disk; alpha is dropped
    pub fn open(path: &Path) -> Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("Failed to load frame image: {:?}", path))?;
        Ok(Self::new(img.to_rgb8()))
    }

    /// The frame's pixels
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
