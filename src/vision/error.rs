//! Error taxonomy for the detection engine
//!
//! None of these reach the caller of `DetectionEngine::detect`; they are logged
//! where they occur and the affected template or worker yields nothing.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("template directory not found: {0:?}")]
    TemplateDirMissing(PathBuf),

    #[error("failed to read template directory {path:?}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("template '{name}' already loaded, skipping {path:?}")]
    DuplicateTemplate { name: String, path: PathBuf },

    #[error("image {0:?} has no pixels")]
    EmptyImage(PathBuf),

    #[error("template {template:?} does not fit in frame {frame:?}")]
    TemplateTooLarge {
        template: (u32, u32),
        frame: (u32, u32),
    },
}
