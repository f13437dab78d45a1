//! Capture Layer
//!
//! Live screen grabbing lives outside this tool; frames are replayed from image
//! files that were captured from the watched region, one per capture tick.

pub mod frame;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use frame::Frame;

use crate::storage;

/// Frame replay configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Time between two capture ticks
    pub interval: Duration,
    /// File extensions accepted as frames
    pub extensions: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            extensions: vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()],
        }
    }
}

/// Replays captured frames from disk in file-name order
pub struct ReplayCapture {
    config: CaptureConfig,
    frames: Vec<PathBuf>,
    position: usize,
}

impl ReplayCapture {
    /// Open a directory of frames, or a single frame file
    pub fn open(path: &Path, config: CaptureConfig) -> Result<Self> {
        let frames = if path.is_dir() {
            storage::list_images(path, &config.extensions)
                .with_context(|| format!("Failed to list frames in {:?}", path))?
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            anyhow::bail!("Frame source not found: {:?}", path);
        };

        Ok(Self {
            config,
            frames,
            position: 0,
        })
    }

    /// Time the caller should wait between two frames
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Number of frames in this source
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Iterator for ReplayCapture {
    type Item = (PathBuf, Result<Frame>);

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.frames.get(self.position)?.clone();
        self.position += 1;
        let frame = Frame::open(&path);
        Some((path, frame))
    }
}
