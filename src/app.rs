//! Application Coordinator
//!
//! Runs the detection engine on its own thread. Frames and reset requests go
//! in over a channel, scan outcomes come back over another, and the running
//! totals live in shared state.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info};

use crate::capture::Frame;
use crate::config::AppConfig;
use crate::shared::{ScanOutcome, SharedTrackerState, TrackerCommand, TrackerEvent};
use crate::vision::DetectionEngine;

/// Main application coordinator
pub struct CardTrackerApp {
    /// Shared state between the tracker thread and the caller
    pub shared_state: Arc<RwLock<SharedTrackerState>>,
    /// Channel to send commands to the tracker
    to_tracker: Sender<TrackerCommand>,
    /// Channel to receive events from the tracker
    pub from_tracker: Receiver<TrackerEvent>,
    /// Handle to tracker thread
    tracker_handle: Option<JoinHandle<()>>,
}

impl CardTrackerApp {
    /// Load templates per `config` and start tracking
    pub fn new(config: AppConfig) -> Result<Self> {
        let engine = DetectionEngine::from_config(&config);
        Self::with_engine(config, engine)
    }

    /// Start tracking with a prepared engine
    pub fn with_engine(config: AppConfig, engine: DetectionEngine) -> Result<Self> {
        let shared_state = Arc::new(RwLock::new(SharedTrackerState::new(config)));
        // one frame in flight: a new capture waits for the previous scan
        let (to_tracker, tracker_rx) = bounded(1);
        let (tracker_tx, from_tracker) = unbounded();

        {
            let mut state = shared_state.write();
            state.runtime.template_count = engine.template_count();
            state.runtime.start_round();
        }

        let thread_state = shared_state.clone();
        let handle = std::thread::Builder::new()
            .name("card-tracker".to_string())
            .spawn(move || {
                info!("Tracker thread starting...");
                run_tracker(engine, tracker_rx, tracker_tx, thread_state);
                info!("Tracker thread exiting...");
            })?;

        Ok(Self {
            shared_state,
            to_tracker,
            from_tracker,
            tracker_handle: Some(handle),
        })
    }

    /// Queue a captured frame for scanning
    pub fn scan(&self, frame: Frame) -> Result<()> {
        self.send(TrackerCommand::Scan(frame))
    }

    /// Start a new round
    pub fn reset(&self) -> Result<()> {
        self.send(TrackerCommand::Reset)
    }

    fn send(&self, command: TrackerCommand) -> Result<()> {
        self.to_tracker
            .send(command)
            .map_err(|_| anyhow!("Tracker thread is not running"))
    }

    /// Get current shared state
    pub fn state(&self) -> Arc<RwLock<SharedTrackerState>> {
        self.shared_state.clone()
    }
}

impl Drop for CardTrackerApp {
    fn drop(&mut self) {
        // Signal tracker to stop
        let _ = self.to_tracker.send(TrackerCommand::Shutdown);

        // Wait for tracker thread to finish
        if let Some(handle) = self.tracker_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Tracker thread body: one command at a time until shutdown
fn run_tracker(
    mut engine: DetectionEngine,
    commands: Receiver<TrackerCommand>,
    events: Sender<TrackerEvent>,
    state: Arc<RwLock<SharedTrackerState>>,
) {
    for command in commands.iter() {
        match command {
            TrackerCommand::Scan(frame) => {
                let start = Instant::now();
                let detections = engine.detect(&frame);
                let outcome = ScanOutcome {
                    detections,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                    latency_ms: frame.timestamp.elapsed().as_millis() as u64,
                    detected_total: engine.detected_count(),
                };

                state
                    .write()
                    .runtime
                    .record_scan(&outcome, engine.stats(), engine.detected());

                if events.send(TrackerEvent::Scanned(outcome)).is_err() {
                    debug!("Event receiver dropped, stopping tracker");
                    break;
                }
            }
            TrackerCommand::Reset => {
                engine.reset();
                state.write().runtime.start_round();
                info!("New round started");
                let _ = events.send(TrackerEvent::RoundReset);
            }
            TrackerCommand::Shutdown => break,
        }
    }

    let _ = events.send(TrackerEvent::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::scheduler::{FixedLoad, Scheduler};
    use crate::vision::templates::{Template, TemplateStore};
    use image::{Rgb, RgbImage};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    fn card() -> RgbImage {
        RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, ((x + y) * 13) as u8]))
    }

    fn app() -> CardTrackerApp {
        let config = AppConfig::default();
        let mut store = TemplateStore::new();
        store.insert(Template::new("Hearts Ace", card())).unwrap();
        let scheduler = Scheduler::new(
            config.scheduler.clone(),
            Box::new(FixedLoad { cores: 4, utilization: 10.0 }),
        );
        let engine = DetectionEngine::new(store, &config, scheduler);
        CardTrackerApp::with_engine(config, engine).unwrap()
    }

    fn frame_with_card() -> Frame {
        let mut img = RgbImage::from_pixel(30, 30, Rgb([0, 90, 30]));
        image::imageops::replace(&mut img, &card(), 5, 9);
        Frame::new(img)
    }

    fn next_scan(app: &CardTrackerApp) -> ScanOutcome {
        match app.from_tracker.recv_timeout(WAIT).unwrap() {
            TrackerEvent::Scanned(outcome) => outcome,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_scan_and_reset_through_tracker_thread() {
        let app = app();

        app.scan(frame_with_card()).unwrap();
        let outcome = next_scan(&app);
        assert_eq!(outcome.detections.len(), 1);
        assert_eq!(outcome.detections[0].location, (5, 9));
        assert_eq!(outcome.detected_total, 1);
        assert!(outcome.latency_ms >= outcome.elapsed_ms);

        app.scan(frame_with_card()).unwrap();
        assert!(next_scan(&app).detections.is_empty());

        app.reset().unwrap();
        assert!(matches!(
            app.from_tracker.recv_timeout(WAIT).unwrap(),
            TrackerEvent::RoundReset
        ));

        app.scan(frame_with_card()).unwrap();
        assert_eq!(next_scan(&app).detections.len(), 1);

        let state = app.state();
        let guard = state.read();
        let runtime = &guard.runtime;
        assert_eq!(runtime.frames_received, 3);
        assert_eq!(runtime.frames_with_detections, 2);
        assert_eq!(runtime.detected_cards, vec!["Hearts Ace"]);
        assert_eq!(runtime.rounds, 2);
        assert_eq!(runtime.template_count, 1);
    }

    #[test]
    fn test_drop_stops_thread() {
        let app = app();
        let events = app.from_tracker.clone();
        drop(app);
        assert!(events.iter().any(|e| matches!(e, TrackerEvent::Stopped)));
    }
}
