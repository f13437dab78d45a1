//! Shared runtime state between the tracker thread and its owner

use std::collections::HashSet;

use crate::config::AppConfig;
use crate::vision::EngineStats;

use super::messages::ScanOutcome;

/// Central shared state
#[derive(Debug, Clone, Default)]
pub struct SharedTrackerState {
    /// Application configuration
    pub config: AppConfig,
    /// Runtime state (not persisted)
    pub runtime: RuntimeState,
}

impl SharedTrackerState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            runtime: RuntimeState::default(),
        }
    }
}

/// Runtime state that is not persisted
#[derive(Debug, Clone, Default)]
pub struct RuntimeState {
    /// Templates available for matching
    pub template_count: usize,
    /// Frames handed to the engine
    pub frames_received: u64,
    /// Frames that produced at least one detection
    pub frames_with_detections: u64,
    /// Cards found in the current round, sorted by name
    pub detected_cards: Vec<String>,
    /// Rounds started (the first round counts)
    pub rounds: u64,
    /// Engine counters as of the last frame
    pub engine: EngineStats,
    /// Last error message (if any)
    pub last_error: Option<String>,
}

impl RuntimeState {
    /// Fold one processed frame into the counters
    pub fn record_scan(
        &mut self,
        outcome: &ScanOutcome,
        engine: EngineStats,
        detected: HashSet<String>,
    ) {
        self.frames_received += 1;
        if !outcome.detections.is_empty() {
            self.frames_with_detections += 1;
        }
        let mut cards: Vec<String> = detected.into_iter().collect();
        cards.sort();
        self.detected_cards = cards;
        self.engine = engine;
    }

    /// A new round has begun
    pub fn start_round(&mut self) {
        self.rounds += 1;
        self.detected_cards.clear();
    }

    /// Set an error message
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}
