//! Application Configuration
//!
//! Detection tuning and file locations stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::CaptureConfig;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Card template settings
    pub templates: TemplateSettings,
    /// Matching settings
    pub detection: DetectionSettings,
    /// Worker scheduling settings
    pub scheduler: SchedulerConfig,
    /// Capture settings
    pub capture: CaptureSettings,
}

/// Where card templates come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    /// Directory holding one image per card
    pub directory: PathBuf,
    /// Accepted image extensions (case-insensitive)
    pub extensions: Vec<String>,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("CROPPEDCARDS"),
            extensions: vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()],
        }
    }
}

/// Matching thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Minimum correlation at full resolution
    pub match_threshold: f32,
    /// Minimum correlation when matching on down-scaled images
    pub scaled_match_threshold: f32,
    /// Resize factor applied to templates and frames (1.0 = full resolution)
    pub match_scale: f32,
    /// Mean per-channel difference below which a frame counts as unchanged
    pub change_threshold: f64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            match_threshold: 0.99,
            scaled_match_threshold: 0.95,
            match_scale: 1.0,
            change_threshold: 5.0,
        }
    }
}

impl DetectionSettings {
    /// Threshold matching the configured scale
    pub fn effective_threshold(&self) -> f32 {
        if crate::vision::preprocess::is_unit_scale(self.match_scale) {
            self.match_threshold
        } else {
            self.scaled_match_threshold
        }
    }
}

/// Worker-count tiers and CPU load bands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Cores needed for the high tier
    pub high_core_count: usize,
    /// Cores needed for the middle tier
    pub mid_core_count: usize,
    pub high_tier_workers: usize,
    pub mid_tier_workers: usize,
    pub low_tier_workers: usize,
    /// Upper bound after load adjustment
    pub max_workers: usize,
    /// Lower bound after load adjustment
    pub min_workers: usize,
    /// Below this CPU percentage, add workers
    pub low_load_percent: f32,
    /// At or above this CPU percentage, remove workers
    pub high_load_percent: f32,
    /// Workers added or removed per load band
    pub worker_step: usize,
    /// CPU sampling window in milliseconds
    pub sample_interval_ms: u64,
    /// Assume this CPU percentage instead of sampling the host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_load_percent: Option<f32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            high_core_count: 8,
            mid_core_count: 4,
            high_tier_workers: 13,
            mid_tier_workers: 8,
            low_tier_workers: 4,
            max_workers: 13,
            min_workers: 2,
            low_load_percent: 30.0,
            high_load_percent: 60.0,
            worker_step: 2,
            sample_interval_ms: 100,
            fixed_load_percent: None,
        }
    }
}

/// Capture-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Time between capture ticks in milliseconds
    pub interval_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self { interval_ms: 100 }
    }
}

impl AppConfig {
    /// Frame replay settings derived from this configuration
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            interval: Duration::from_millis(self.capture.interval_ms),
            ..CaptureConfig::default()
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config {:?}", path))?;
    Ok(())
}
