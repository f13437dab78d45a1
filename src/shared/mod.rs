//! Shared state and messaging between the caller and the tracker thread
//!
//! This module provides thread-safe shared state and message passing
//! for driving the detection engine from a capture loop.

pub mod messages;
pub mod state;

pub use messages::{ScanOutcome, TrackerCommand, TrackerEvent};
pub use state::SharedTrackerState;
