//! CardTracker - tracks which playing cards have appeared on screen
//!
//! Captured frames of the watched table region are matched against a library
//! of card images; every card is reported once per round.

mod analysis;
mod app;
mod capture;
mod config;
mod shared;
mod storage;
mod vision;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::analysis::detection_summary;
use crate::app::CardTrackerApp;
use crate::capture::{CaptureConfig, ReplayCapture};
use crate::config::AppConfig;
use crate::shared::{ScanOutcome, TrackerEvent};

/// CardTracker - reports cards as they appear in captured frames
#[derive(Parser, Debug)]
#[command(name = "card-tracker")]
#[command(about = "Tracks which playing cards have appeared in a watched screen region")]
struct Args {
    /// Configuration file (default: config.toml in the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Card template directory (overrides the configuration)
    #[arg(short, long)]
    templates: Option<PathBuf>,

    /// Milliseconds between two frames (overrides the configuration)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Write the default configuration and exit
    #[arg(long)]
    write_config: bool,

    /// Captured frames for one round (directory or single image); repeat for more rounds
    #[arg(short, long = "round", value_name = "PATH")]
    rounds: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.log_file.as_deref())?;

    if args.write_config {
        let path = match args.config {
            Some(path) => path,
            None => default_config_path()?,
        };
        config::save_config(&AppConfig::default(), &path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config = load_or_default_config(args.config.as_deref())?;
    if let Some(dir) = args.templates {
        config.templates.directory = dir;
    }
    if let Some(ms) = args.interval_ms {
        config.capture.interval_ms = ms;
    }

    if args.rounds.is_empty() {
        bail!("No frames to track; pass one or more --round <PATH>");
    }

    info!("CardTracker starting...");

    let app = CardTrackerApp::new(config)?;
    let state = app.state();
    let capture_config = state.read().config.capture_config();

    for (i, round) in args.rounds.iter().enumerate() {
        if i > 0 {
            app.reset()?;
            wait_for_reset(&app)?;
        }
        info!("Round {}: replaying frames from {:?}", i + 1, round);
        replay_round(&app, round, capture_config.clone())?;

        let cards = state.read().runtime.detected_cards.clone();
        println!("Round {}: {} cards seen", i + 1, cards.len());
        for card in &cards {
            println!("  {}", card);
        }
    }

    let runtime = state.read().runtime.clone();
    println!("Rounds:             {}", runtime.rounds);
    println!("Templates:          {}", runtime.template_count);
    println!("Frames:             {}", runtime.frames_received);
    println!("Frames with cards:  {}", runtime.frames_with_detections);
    println!("Frames scanned:     {}", runtime.engine.scans);
    println!("Frames unchanged:   {}", runtime.engine.skipped);
    println!("Correlations:       {}", runtime.engine.correlations);
    println!("Failed workers:     {}", runtime.engine.failed_workers);
    if let Some(error) = &runtime.last_error {
        println!("Last error:         {}", error);
    }

    info!("CardTracker shutdown complete");

    Ok(())
}

/// Console logging plus an optional plain-text log file
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file {:?}", path))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()?;

    Ok(())
}

fn default_config_path() -> Result<PathBuf> {
    Ok(storage::get_config_dir()?.join("config.toml"))
}

/// Load configuration from the given file, the user config directory, or defaults
fn load_or_default_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(path) = default_config_path() {
        if path.exists() {
            match config::load_config(&path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    return Ok(config);
                }
                Err(e) => warn!("Ignoring unreadable configuration: {:#}", e),
            }
        }
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}

/// Feed one round of captured frames to the tracker at the capture interval
fn replay_round(app: &CardTrackerApp, source: &Path, capture_config: CaptureConfig) -> Result<()> {
    let capture = ReplayCapture::open(source, capture_config)?;
    if capture.is_empty() {
        warn!("No frames found in {:?}", source);
        return Ok(());
    }
    let interval = capture.interval();
    info!("{} frames queued", capture.len());

    for (path, frame) in capture {
        let tick = Instant::now();

        match frame {
            Ok(frame) => {
                debug!("{:?}: {:?} frame", path, frame.dimensions());
                app.scan(frame)?;
                let outcome = wait_for_scan(app)?;
                if outcome.latency_ms > interval.as_millis() as u64 {
                    debug!(
                        "Frame took {} ms from capture to result, longer than the {:?} tick",
                        outcome.latency_ms, interval
                    );
                }
                if !outcome.detections.is_empty() {
                    info!(
                        "{:?} ({} ms, {} cards this round)\n{}",
                        path.file_name().unwrap_or_default(),
                        outcome.elapsed_ms,
                        outcome.detected_total,
                        detection_summary(&outcome.detections)
                    );
                }
            }
            Err(e) => {
                warn!("Skipping frame: {:#}", e);
                app.state().write().runtime.set_error(format!("{:#}", e));
            }
        }

        if let Some(rest) = interval.checked_sub(tick.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    Ok(())
}

/// Block until the tracker reports the frame it was just given
fn wait_for_scan(app: &CardTrackerApp) -> Result<ScanOutcome> {
    for event in app.from_tracker.iter() {
        match event {
            TrackerEvent::Scanned(outcome) => return Ok(outcome),
            TrackerEvent::RoundReset => continue,
            TrackerEvent::Stopped => break,
        }
    }
    bail!("Tracker stopped unexpectedly")
}

/// Block until the tracker has started the new round
fn wait_for_reset(app: &CardTrackerApp) -> Result<()> {
    for event in app.from_tracker.iter() {
        match event {
            TrackerEvent::RoundReset => return Ok(()),
            TrackerEvent::Scanned(_) => continue,
            TrackerEvent::Stopped => break,
        }
    }
    bail!("Tracker stopped unexpectedly")
}
