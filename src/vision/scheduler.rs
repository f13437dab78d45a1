//! Adaptive Scheduler
//!
//! Picks how many match workers to run for a scan from the core count and the
//! current CPU load, then splits the undetected templates between them.
//! Idle machines get extra workers; busy ones get fewer so the interactive
//! session stays responsive.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use sysinfo::System;
use tracing::debug;

use crate::config::SchedulerConfig;

/// Source of machine load figures
pub trait LoadMonitor: Send + Sync {
    /// Logical CPU cores available
    fn core_count(&self) -> usize;

    /// Global CPU utilization in percent (0-100)
    fn cpu_utilization(&self) -> f32;
}

/// Logical cores this process may run on
pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Reads the host's CPU usage as the delta between two refreshes.
///
/// One `System` lives across scans, so a reading normally costs a refresh and
/// no wait. Only the very first reading blocks for the minimum window; within
/// a window of the previous refresh the last reading is reused.
pub struct SystemLoadMonitor {
    min_interval: Duration,
    sample: Mutex<LoadSample>,
}

struct LoadSample {
    system: System,
    refreshed: Instant,
    usage: Option<f32>,
}

impl SystemLoadMonitor {
    pub fn new(sample_window: Duration) -> Self {
        // sysinfo needs at least this long between refreshes for a usable figure
        let min_interval = sample_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);

        let mut system = System::new();
        system.refresh_cpu();

        Self {
            min_interval,
            sample: Mutex::new(LoadSample {
                system,
                refreshed: Instant::now(),
                usage: None,
            }),
        }
    }
}

impl LoadMonitor for SystemLoadMonitor {
    fn core_count(&self) -> usize {
        available_cores()
    }

    fn cpu_utilization(&self) -> f32 {
        let mut sample = self.sample.lock();
        let elapsed = sample.refreshed.elapsed();

        match sample.usage {
            Some(usage) if elapsed < self.min_interval => return usage,
            Some(_) => {}
            None => {
                if let Some(rest) = self.min_interval.checked_sub(elapsed) {
                    std::thread::sleep(rest);
                }
            }
        }

        sample.system.refresh_cpu();
        sample.refreshed = Instant::now();
        let usage = sample.system.global_cpu_info().cpu_usage();
        sample.usage = Some(usage);
        usage
    }
}

/// Constant figures, used when the configuration pins the CPU load
#[derive(Debug, Clone, Copy)]
pub struct FixedLoad {
    pub cores: usize,
    pub utilization: f32,
}

impl LoadMonitor for FixedLoad {
    fn core_count(&self) -> usize {
        self.cores
    }

    fn cpu_utilization(&self) -> f32 {
        self.utilization
    }
}

/// Work split for one scan
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulePlan {
    pub worker_count: usize,
    /// One chunk per worker, each a list of indices into the remaining templates
    pub partitions: Vec<Vec<usize>>,
}

pub struct Scheduler {
    config: SchedulerConfig,
    monitor: Box<dyn LoadMonitor>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, monitor: Box<dyn LoadMonitor>) -> Self {
        Self { config, monitor }
    }

    /// Worker count for the current core count and load
    pub fn worker_count(&self) -> usize {
        let cores = self.monitor.core_count();
        let base = self.base_workers(cores);
        let load = self.monitor.cpu_utilization();
        let count = self.adjust_for_load(base, load);

        debug!("Scheduler: {} cores, {:.1}% load -> {} workers", cores, load, count);
        count
    }

    /// Plan a scan over `remaining` undetected templates
    pub fn plan(&self, remaining: usize) -> SchedulePlan {
        let worker_count = self.worker_count();
        SchedulePlan {
            worker_count,
            partitions: partition(remaining, worker_count),
        }
    }

    fn base_workers(&self, cores: usize) -> usize {
        let c = &self.config;
        if cores >= c.high_core_count {
            c.high_tier_workers
        } else if cores >= c.mid_core_count {
            c.mid_tier_workers
        } else {
            c.low_tier_workers
        }
    }

    fn adjust_for_load(&self, base: usize, load: f32) -> usize {
        let c = &self.config;
        if load < c.low_load_percent {
            (base + c.worker_step).min(c.max_workers)
        } else if load < c.high_load_percent {
            base
        } else {
            base.saturating_sub(c.worker_step).max(c.min_workers)
        }
    }
}

/// Split `0..len` into `workers` contiguous chunks of `len / workers` items,
/// the last chunk taking whatever the integer division left over.
///
/// With fewer items than workers each of the first `len` chunks gets one
/// item and the rest stay empty, so late-round scans still fan out.
pub fn partition(len: usize, workers: usize) -> Vec<Vec<usize>> {
    let workers = workers.max(1);
    let chunk = (len / workers).max(1);

    (0..workers)
        .map(|i| {
            let start = (i * chunk).min(len);
            let end = if i + 1 == workers {
                len
            } else {
                (start + chunk).min(len)
            };
            (start..end).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn scheduler(cores: usize, utilization: f32) -> Scheduler {
        Scheduler::new(
            SchedulerConfig::default(),
            Box::new(FixedLoad { cores, utilization }),
        )
    }

    #[test]
    fn test_base_tiers_at_medium_load() {
        assert_eq!(scheduler(16, 45.0).worker_count(), 13);
        assert_eq!(scheduler(8, 45.0).worker_count(), 13);
        assert_eq!(scheduler(6, 45.0).worker_count(), 8);
        assert_eq!(scheduler(4, 45.0).worker_count(), 8);
        assert_eq!(scheduler(2, 45.0).worker_count(), 4);
    }

    #[test]
    fn test_low_load_adds_workers_capped() {
        assert_eq!(scheduler(8, 10.0).worker_count(), 13);
        assert_eq!(scheduler(4, 10.0).worker_count(), 10);
        assert_eq!(scheduler(1, 29.9).worker_count(), 6);
    }

    #[test]
    fn test_high_load_removes_workers_floored() {
        assert_eq!(scheduler(8, 60.0).worker_count(), 11);
        assert_eq!(scheduler(4, 95.0).worker_count(), 6);
        assert_eq!(scheduler(2, 80.0).worker_count(), 2);
    }

    #[test]
    fn test_floor_applies_to_small_tiers() {
        let config = SchedulerConfig {
            low_tier_workers: 3,
            ..SchedulerConfig::default()
        };
        let s = Scheduler::new(config, Box::new(FixedLoad { cores: 1, utilization: 99.0 }));
        assert_eq!(s.worker_count(), 2);
    }

    #[test]
    fn test_boundaries_are_half_open() {
        assert_eq!(scheduler(4, 30.0).worker_count(), 8);
        assert_eq!(scheduler(4, 59.99).worker_count(), 8);
    }

    #[test]
    fn test_partition_last_chunk_takes_remainder() {
        let parts = partition(10, 3);
        assert_eq!(parts, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8, 9]]);
    }

    #[test]
    fn test_partition_more_workers_than_items() {
        let parts = partition(3, 5);
        assert_eq!(parts, vec![vec![0], vec![1], vec![2], vec![], vec![]]);

        let parts = partition(12, 13);
        assert_eq!(parts.iter().filter(|p| p.len() == 1).count(), 12);
        assert!(parts[12].is_empty());
    }

    #[test]
    fn test_partition_exact_multiple() {
        let parts = partition(26, 13);
        assert!(parts.iter().all(|p| p.len() == 2));
    }

    #[test]
    fn test_partition_complete_and_disjoint() {
        for len in 0..40 {
            for workers in 1..15 {
                let parts = partition(len, workers);
                assert_eq!(parts.len(), workers);

                let mut seen = HashSet::new();
                for idx in parts.iter().flatten() {
                    assert!(seen.insert(*idx), "index {idx} assigned twice");
                }
                assert_eq!(seen, (0..len).collect::<HashSet<_>>());
            }
        }
    }

    #[test]
    fn test_system_monitor_reuses_recent_reading() {
        let monitor = SystemLoadMonitor::new(Duration::from_millis(100));
        assert!(monitor.core_count() >= 1);

        let first = monitor.cpu_utilization();
        let start = Instant::now();
        let second = monitor.cpu_utilization();

        assert_eq!(first, second);
        assert!(start.elapsed() < Duration::from_millis(50));
        assert!(first >= 0.0);
    }

    #[test]
    fn test_plan_uses_worker_count() {
        let plan = scheduler(8, 45.0).plan(52);
        assert_eq!(plan.worker_count, 13);
        assert_eq!(plan.partitions.len(), 13);
        assert!(plan.partitions.iter().all(|p| p.len() == 4));
    }
}
