//! Vision Layer
//!
//! Card detection on captured frames: a fixed template library matched in
//! parallel against each frame, with already-seen cards and unchanged frames
//! skipped.

pub mod change_filter;
pub mod correlation;
pub mod detection;
pub mod engine;
pub mod error;
pub mod memory;
pub mod preprocess;
pub mod scheduler;
pub mod templates;

pub use detection::DetectionResult;
pub use engine::{DetectionEngine, EngineStats};
