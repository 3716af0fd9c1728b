//! Process memory and CPU sampling for scan throttling

use chrono::Timelike;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

use vidcache_common::settings::{ProcessingPriority, ScanSettings};

pub const MEMORY_USAGE_HISTORY_SIZE: usize = 10;
/// CPU readings are reused for this long
pub const CPU_CHECK_INTERVAL: Duration = Duration::from_millis(5000);

const MEMORY_HIGH_THRESHOLD: f64 = 80.0;
const MEMORY_LOW_THRESHOLD: f64 = 40.0;
const BATCH_SIZE_REDUCTION_RATIO: f64 = 0.5;
const BATCH_SIZE_INCREASE_RATIO: f64 = 1.5;
const MIN_BATCH_SIZE_AFTER_REDUCTION: usize = 5;
const MAX_BATCH_SIZE: usize = 200;
const LOW_PRIORITY_RATIO: f64 = 0.7;
const HIGH_PRIORITY_RATIO: f64 = 1.3;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Point-in-time resource figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    /// Resident memory of this process
    pub process_memory_mb: u64,
    pub system_total_mb: u64,
    /// System-wide memory in use, 0-100
    pub memory_usage_percent: f64,
    /// Global CPU usage, 0-100
    pub cpu_percent: f32,
}

/// Outcome of [`ResourceMonitor::check_system_resources`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceCheck {
    pub memory_ok: bool,
    pub cpu_ok: bool,
    pub should_pause: bool,
    pub message: Option<String>,
}

struct Sampler {
    system: System,
    pid: Option<Pid>,
    last_cpu: Option<(Instant, f32)>,
}

pub struct ResourceMonitor {
    sampler: Mutex<Sampler>,
    memory_history: Mutex<VecDeque<u64>>,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| tracing::warn!("Current pid unavailable, process memory reads as 0: {}", e))
            .ok();
        Self {
            sampler: Mutex::new(Sampler {
                system: System::new_with_specifics(RefreshKind::nothing()),
                pid,
                last_cpu: None,
            }),
            memory_history: Mutex::new(VecDeque::with_capacity(MEMORY_USAGE_HISTORY_SIZE)),
        }
    }

    /// Sample memory (and CPU, at most every [`CPU_CHECK_INTERVAL`])
    ///
    /// Every call appends the process memory to the history.
    pub fn snapshot(&self) -> ResourceSnapshot {
        let mut sampler = self.sampler.lock().unwrap_or_else(PoisonError::into_inner);

        sampler.system.refresh_memory();
        let total = sampler.system.total_memory();
        let used = sampler.system.used_memory();

        let process_bytes = match sampler.pid {
            Some(pid) => {
                sampler.system.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[pid]),
                    false,
                    ProcessRefreshKind::nothing().with_memory(),
                );
                sampler.system.process(pid).map(Process::memory).unwrap_or(0)
            }
            None => 0,
        };

        let cpu_percent = match sampler.last_cpu {
            Some((at, value)) if at.elapsed() < CPU_CHECK_INTERVAL => value,
            _ => {
                sampler.system.refresh_cpu_usage();
                let value = sampler.system.global_cpu_usage();
                sampler.last_cpu = Some((Instant::now(), value));
                value
            }
        };
        drop(sampler);

        let process_memory_mb = process_bytes / BYTES_PER_MB;
        self.push_history(process_memory_mb);

        ResourceSnapshot {
            process_memory_mb,
            system_total_mb: total / BYTES_PER_MB,
            memory_usage_percent: if total > 0 {
                (used as f64 / total as f64 * 100.0).round()
            } else {
                0.0
            },
            cpu_percent,
        }
    }

    fn push_history(&self, process_memory_mb: u64) {
        let mut history = self.memory_history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push_back(process_memory_mb);
        while history.len() > MEMORY_USAGE_HISTORY_SIZE {
            history.pop_front();
        }
    }

    /// Average of the history, once it holds at least three samples
    fn history_average(&self) -> Option<f64> {
        let history = self.memory_history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() < 3 {
            return None;
        }
        Some(history.iter().sum::<u64>() as f64 / history.len() as f64)
    }

    pub fn reset_memory_history(&self) {
        self.memory_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Whether the process is above `memory_threshold_mb`
    pub fn memory_exceeded(&self, settings: &ScanSettings) -> bool {
        self.snapshot().process_memory_mb > settings.memory_threshold_mb
    }

    /// Memory, CPU and time-window gate
    pub fn check_system_resources(&self, settings: &ScanSettings) -> ResourceCheck {
        let snapshot = self.snapshot();
        evaluate_resources(settings, &snapshot, chrono::Local::now().hour())
    }

    /// `batch_size` adjusted for memory pressure and priority
    pub fn calculate_optimal_batch_size(&self, settings: &ScanSettings) -> usize {
        let snapshot = self.snapshot();
        let batch_size = optimal_batch_size(
            settings,
            snapshot.memory_usage_percent,
            self.history_average(),
        );
        if batch_size != settings.batch_size {
            tracing::debug!(
                batch_size,
                configured = settings.batch_size,
                memory_usage_percent = snapshot.memory_usage_percent,
                "Adjusted batch size"
            );
        }
        batch_size
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn evaluate_resources(settings: &ScanSettings, snapshot: &ResourceSnapshot, hour: u32) -> ResourceCheck {
    let memory_ok = snapshot.process_memory_mb <= settings.memory_threshold_mb;
    let cpu_ok =
        !settings.auto_pause_on_high_cpu || snapshot.cpu_percent <= settings.auto_pause_threshold;

    let mut message = None;
    if !memory_ok {
        message = Some(format!(
            "Memory usage above threshold: {}MB > {}MB",
            snapshot.process_memory_mb, settings.memory_threshold_mb
        ));
    } else if !cpu_ok {
        message = Some(format!(
            "CPU usage above threshold: {:.0}% > {:.0}%",
            snapshot.cpu_percent, settings.auto_pause_threshold
        ));
    }

    let window = settings.auto_pause_time_range;
    if message.is_none() && window.contains_hour(hour) {
        message = Some(format!(
            "Auto-pause window active ({}:00-{}:00)",
            window.start_hour, window.end_hour
        ));
    }

    ResourceCheck {
        memory_ok,
        cpu_ok,
        should_pause: message.is_some(),
        message,
    }
}

fn optimal_batch_size(settings: &ScanSettings, usage_percent: f64, history_avg: Option<f64>) -> usize {
    let mut batch_size = settings.batch_size;

    if usage_percent > MEMORY_HIGH_THRESHOLD {
        batch_size = ((batch_size as f64 * BATCH_SIZE_REDUCTION_RATIO).floor() as usize)
            .max(MIN_BATCH_SIZE_AFTER_REDUCTION);
    } else if usage_percent < MEMORY_LOW_THRESHOLD {
        if let Some(avg) = history_avg {
            if avg < settings.memory_threshold_mb as f64 * 0.5 {
                batch_size = ((batch_size as f64 * BATCH_SIZE_INCREASE_RATIO).floor() as usize)
                    .min(MAX_BATCH_SIZE);
            }
        }
    }

    batch_size = match settings.processing_priority {
        ProcessingPriority::Low => (batch_size as f64 * LOW_PRIORITY_RATIO).floor() as usize,
        ProcessingPriority::High => (batch_size as f64 * HIGH_PRIORITY_RATIO).floor() as usize,
        ProcessingPriority::Normal => batch_size,
    };

    batch_size.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidcache_common::settings::AutoPauseTimeRange;

    fn snapshot(process_memory_mb: u64, cpu_percent: f32) -> ResourceSnapshot {
        ResourceSnapshot {
            process_memory_mb,
            system_total_mb: 16_000,
            memory_usage_percent: 50.0,
            cpu_percent,
        }
    }

    #[test]
    fn test_memory_breach_pauses() {
        let settings = ScanSettings::default();
        let check = evaluate_resources(&settings, &snapshot(2000, 0.0), 12);
        assert!(!check.memory_ok);
        assert!(check.should_pause);
    }

    #[test]
    fn test_cpu_only_counts_when_enabled() {
        let mut settings = ScanSettings::default();
        assert!(evaluate_resources(&settings, &snapshot(10, 99.0), 12).cpu_ok);

        settings.auto_pause_on_high_cpu = true;
        let check = evaluate_resources(&settings, &snapshot(10, 99.0), 12);
        assert!(!check.cpu_ok);
        assert!(check.should_pause);
    }

    #[test]
    fn test_time_window_wraps_midnight() {
        let settings = ScanSettings {
            auto_pause_time_range: AutoPauseTimeRange {
                enabled: true,
                start_hour: 22,
                end_hour: 6,
            },
            ..Default::default()
        };
        assert!(evaluate_resources(&settings, &snapshot(10, 0.0), 23).should_pause);
        assert!(evaluate_resources(&settings, &snapshot(10, 0.0), 3).should_pause);
        assert!(!evaluate_resources(&settings, &snapshot(10, 0.0), 12).should_pause);
    }

    #[test]
    fn test_batch_size_reduced_under_pressure() {
        let settings = ScanSettings { batch_size: 8, ..Default::default() };
        assert_eq!(optimal_batch_size(&settings, 90.0, None), 5);

        let settings = ScanSettings { batch_size: 50, ..Default::default() };
        assert_eq!(optimal_batch_size(&settings, 90.0, None), 25);
    }

    #[test]
    fn test_batch_size_increased_with_stable_history() {
        let settings = ScanSettings { batch_size: 150, ..Default::default() };
        assert_eq!(optimal_batch_size(&settings, 20.0, Some(100.0)), 200);
        // Not enough history: unchanged
        assert_eq!(optimal_batch_size(&settings, 20.0, None), 150);
    }

    #[test]
    fn test_priority_scaling() {
        let low = ScanSettings {
            processing_priority: ProcessingPriority::Low,
            ..Default::default()
        };
        assert_eq!(optimal_batch_size(&low, 60.0, None), 35);

        let high = ScanSettings {
            processing_priority: ProcessingPriority::High,
            ..Default::default()
        };
        assert_eq!(optimal_batch_size(&high, 60.0, None), 65);

        let tiny = ScanSettings {
            batch_size: 1,
            processing_priority: ProcessingPriority::Low,
            ..Default::default()
        };
        assert_eq!(optimal_batch_size(&tiny, 60.0, None), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let monitor = ResourceMonitor::new();
        for _ in 0..(MEMORY_USAGE_HISTORY_SIZE + 5) {
            monitor.snapshot();
        }
        assert_eq!(monitor.memory_history.lock().unwrap().len(), MEMORY_USAGE_HISTORY_SIZE);
        monitor.reset_memory_history();
        assert!(monitor.history_average().is_none());
    }
}
