//! Card Detection Engine
//!
//! Turns captured frames into "card is now visible" events:
//! change filter -> scheduler -> parallel match workers -> merged results.

use image::RgbImage;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::change_filter::ChangeFilter;
use super::correlation::PreparedFrame;
use super::detection::{DetectionResult, MatchWorker};
use super::memory::DetectionMemory;
use super::preprocess;
use super::scheduler::{available_cores, FixedLoad, LoadMonitor, Scheduler, SystemLoadMonitor};
use super::templates::{Template, TemplateStore};
use crate::capture::Frame;
use crate::config::AppConfig;

/// Counters accumulated since the engine was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Frames that went through a full scan
    pub scans: u64,
    /// Frames dropped by the change filter
    pub skipped: u64,
    /// Template correlations computed
    pub correlations: usize,
    /// Workers that panicked
    pub failed_workers: u64,
}

pub struct DetectionEngine {
    /// Templates, already resized by `scale`
    store: TemplateStore,
    memory: DetectionMemory,
    filter: ChangeFilter,
    scheduler: Scheduler,
    threshold: f32,
    scale: f32,
    correlations: AtomicUsize,
    scans: u64,
    skipped: u64,
    failed_workers: AtomicU64,
}

impl DetectionEngine {
    /// Build an engine over `store`.
    ///
    /// `store` must have been loaded at `config.detection.match_scale`.
    pub fn new(store: TemplateStore, config: &AppConfig, scheduler: Scheduler) -> Self {
        let detection = &config.detection;

        Self {
            store,
            memory: DetectionMemory::new(),
            filter: ChangeFilter::new(detection.change_threshold),
            scheduler,
            threshold: detection.effective_threshold(),
            scale: detection.match_scale,
            correlations: AtomicUsize::new(0),
            scans: 0,
            skipped: 0,
            failed_workers: AtomicU64::new(0),
        }
    }

    /// Load templates from the configured directory and watch the host's CPU load
    pub fn from_config(config: &AppConfig) -> Self {
        let store = TemplateStore::load(
            &config.templates.directory,
            &config.templates.extensions,
            config.detection.match_scale,
        );

        let monitor: Box<dyn LoadMonitor> = match config.scheduler.fixed_load_percent {
            Some(utilization) => Box::new(FixedLoad {
                cores: available_cores(),
                utilization,
            }),
            None => Box::new(SystemLoadMonitor::new(Duration::from_millis(
                config.scheduler.sample_interval_ms,
            ))),
        };
        let scheduler = Scheduler::new(config.scheduler.clone(), monitor);

        Self::new(store, config, scheduler)
    }

    /// Scan a captured frame for cards not yet seen this round.
    ///
    /// Never fails: every problem is logged and yields fewer (or no) results.
    pub fn detect(&mut self, frame: &Frame) -> Vec<DetectionResult> {
        self.detect_image(frame.image())
    }

    pub fn detect_image(&mut self, image: &RgbImage) -> Vec<DetectionResult> {
        if self.store.is_empty() {
            warn!("No card templates loaded, nothing to detect");
            return Vec::new();
        }

        if image.width() == 0 || image.height() == 0 {
            warn!("Empty frame, nothing to detect");
            return Vec::new();
        }

        let frame: Cow<'_, RgbImage> = if preprocess::is_unit_scale(self.scale) {
            Cow::Borrowed(image)
        } else {
            Cow::Owned(preprocess::downscale(image, self.scale))
        };

        if !self.filter.should_scan(&frame) {
            self.skipped += 1;
            return Vec::new();
        }

        let start = Instant::now();
        self.scans += 1;

        let remaining: Vec<&Template> = self
            .store
            .iter()
            .filter(|t| !self.memory.contains(&t.name))
            .collect();

        let results = if remaining.is_empty() {
            debug!("All {} cards already detected", self.store.len());
            Vec::new()
        } else {
            let prepared = PreparedFrame::new(&frame);
            self.fan_out(&remaining, |worker, chunk| worker.scan(&prepared, chunk))
        };

        if results.is_empty() {
            self.filter.remember(&frame);
            debug!(
                "No match among {} templates in {:?}, frame kept for change detection",
                remaining.len(),
                start.elapsed()
            );
        } else {
            for result in &results {
                debug!("{} found by worker {}", result.template_name, result.worker_id);
            }
            debug!(
                "{} cards found in {:?}, frame not kept for change detection",
                results.len(),
                start.elapsed()
            );
        }

        results
    }

    /// Run `scan` over each non-empty chunk on its own short-lived thread and
    /// wait for all of them. A worker that panics counts as finding nothing.
    fn fan_out<F>(&self, remaining: &[&Template], scan: F) -> Vec<DetectionResult>
    where
        F: Fn(&MatchWorker<'_>, &[&Template]) -> Vec<DetectionResult> + Sync,
    {
        let plan = self.scheduler.plan(remaining.len());
        debug!(
            "Scanning {} templates with {} workers",
            remaining.len(),
            plan.worker_count
        );

        let scan = &scan;
        std::thread::scope(|s| {
            let handles: Vec<_> = plan
                .partitions
                .iter()
                .enumerate()
                .filter(|(_, part)| !part.is_empty())
                .map(|(id, part)| {
                    let chunk: Vec<&Template> = part.iter().map(|&i| remaining[i]).collect();
                    let worker = MatchWorker::new(
                        id,
                        self.threshold,
                        self.scale,
                        &self.memory,
                        &self.correlations,
                    );
                    (id, s.spawn(move || scan(&worker, &chunk)))
                })
                .collect();

            let mut results = Vec::new();
            for (id, handle) in handles {
                match handle.join() {
                    Ok(found) => results.extend(found),
                    Err(_) => {
                        warn!("Worker {} panicked, treating as no detections", id);
                        self.failed_workers.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            results
        })
    }

    /// Start a fresh round: every template becomes eligible again
    pub fn reset(&mut self) {
        self.memory.clear();
        self.filter.clear();
        debug!("Detection state reset");
    }

    /// Names confirmed this round
    pub fn detected(&self) -> HashSet<String> {
        self.memory.snapshot()
    }

    pub fn detected_count(&self) -> usize {
        self.memory.len()
    }

    pub fn template_count(&self) -> usize {
        self.store.len()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            scans: self.scans,
            skipped: self.skipped,
            correlations: self.correlations.load(Ordering::Relaxed),
            failed_workers: self.failed_workers.load(Ordering::Relaxed),
        }
    }
}
