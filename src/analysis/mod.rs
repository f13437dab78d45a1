//! Analysis Layer
//!
//! Turns raw detection results into reports for the caller.

pub mod summary;

pub use summary::detection_summary;
