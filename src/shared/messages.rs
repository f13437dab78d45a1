//! Message types for communication between the caller and the tracker thread

use crate::capture::Frame;
use crate::vision::DetectionResult;

/// Messages sent to the tracker thread
#[derive(Debug)]
pub enum TrackerCommand {
    /// Scan a freshly captured frame
    Scan(Frame),
    /// Start a new round, forgetting every detected card
    Reset,
    /// Request the tracker to shutdown
    Shutdown,
}

/// Messages sent back from the tracker thread
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    /// A frame was processed (possibly skipped as unchanged)
    Scanned(ScanOutcome),
    /// Detection state was cleared
    RoundReset,
    /// Tracker thread has stopped
    Stopped,
}

/// Result of processing one frame
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Cards newly found in this frame
    pub detections: Vec<DetectionResult>,
    /// Wall time spent scanning the frame
    pub elapsed_ms: u64,
    /// Time from capture to result, including any wait in the queue
    pub latency_ms: u64,
    /// Cards found so far this round
    pub detected_total: usize,
}
