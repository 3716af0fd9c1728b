//! Scan and schedule settings shared by the service and its configuration file
//!
//! Both structs are persisted as JSON in the `settings` table and mirrored
//! into the TOML config file on a best-effort basis.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Processing priority used to scale the effective batch size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Hours of the day during which scans pause themselves
///
/// `start_hour > end_hour` describes a window that wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoPauseTimeRange {
    pub enabled: bool,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for AutoPauseTimeRange {
    fn default() -> Self {
        Self {
            enabled: false,
            start_hour: 9,
            end_hour: 18,
        }
    }
}

impl AutoPauseTimeRange {
    /// Whether `hour` (0-23) falls inside the pause window
    pub fn contains_hour(&self, hour: u32) -> bool {
        if !self.enabled {
            return false;
        }
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Tuning knobs for a scan run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Records per database transaction
    pub batch_size: usize,
    /// Files between two progress events
    pub progress_update_interval: usize,
    /// Cooperative sleep in milliseconds
    pub sleep_interval: u64,
    pub processing_priority: ProcessingPriority,
    /// Pipeline concurrency (chunk count / stream buffer)
    pub max_concurrent_operations: usize,
    pub memory_threshold_mb: u64,
    pub auto_pause_on_high_cpu: bool,
    /// CPU percentage above which the pipeline pauses itself
    pub auto_pause_threshold: f32,
    pub auto_pause_time_range: AutoPauseTimeRange,
    pub enable_detailed_logging: bool,
    pub show_resource_monitoring: bool,
    pub enable_performance_metrics: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            progress_update_interval: 100,
            sleep_interval: 1,
            processing_priority: ProcessingPriority::Normal,
            max_concurrent_operations: 1,
            memory_threshold_mb: 1024,
            auto_pause_on_high_cpu: false,
            auto_pause_threshold: 80.0,
            auto_pause_time_range: AutoPauseTimeRange::default(),
            enable_detailed_logging: true,
            show_resource_monitoring: true,
            enable_performance_metrics: true,
        }
    }
}

/// Partial update accepted by the settings surface
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanSettingsUpdate {
    pub batch_size: Option<usize>,
    pub progress_update_interval: Option<usize>,
    pub sleep_interval: Option<u64>,
    pub processing_priority: Option<ProcessingPriority>,
    pub max_concurrent_operations: Option<usize>,
    pub memory_threshold_mb: Option<u64>,
    pub auto_pause_on_high_cpu: Option<bool>,
    pub auto_pause_threshold: Option<f32>,
    pub auto_pause_time_range: Option<AutoPauseTimeRange>,
    pub enable_detailed_logging: Option<bool>,
    pub show_resource_monitoring: Option<bool>,
    pub enable_performance_metrics: Option<bool>,
}

fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(Error::InvalidInput(format!(
            "{} must be between {} and {} (got {})",
            name, min, max, value
        )));
    }
    Ok(())
}

impl ScanSettings {
    /// Reject values outside the supported ranges
    pub fn validate(&self) -> Result<()> {
        check_range("batch_size", self.batch_size, 1, 200)?;
        check_range("progress_update_interval", self.progress_update_interval, 10, 1000)?;
        check_range("sleep_interval", self.sleep_interval, 0, 100)?;
        check_range("max_concurrent_operations", self.max_concurrent_operations, 1, 8)?;
        check_range("memory_threshold_mb", self.memory_threshold_mb, 256, 2048)?;
        check_range("auto_pause_threshold", self.auto_pause_threshold, 50.0, 95.0)?;
        check_range("auto_pause_time_range.start_hour", self.auto_pause_time_range.start_hour, 0, 23)?;
        check_range("auto_pause_time_range.end_hour", self.auto_pause_time_range.end_hour, 0, 23)?;
        Ok(())
    }

    /// Merge a partial update and validate the result
    ///
    /// `self` is left untouched when validation fails.
    pub fn merged(&self, update: ScanSettingsUpdate) -> Result<ScanSettings> {
        let mut next = self.clone();
        if let Some(v) = update.batch_size {
            next.batch_size = v;
        }
        if let Some(v) = update.progress_update_interval {
            next.progress_update_interval = v;
        }
        if let Some(v) = update.sleep_interval {
            next.sleep_interval = v;
        }
        if let Some(v) = update.processing_priority {
            next.processing_priority = v;
        }
        if let Some(v) = update.max_concurrent_operations {
            next.max_concurrent_operations = v;
        }
        if let Some(v) = update.memory_threshold_mb {
            next.memory_threshold_mb = v;
        }
        if let Some(v) = update.auto_pause_on_high_cpu {
            next.auto_pause_on_high_cpu = v;
        }
        if let Some(v) = update.auto_pause_threshold {
            next.auto_pause_threshold = v;
        }
        if let Some(v) = update.auto_pause_time_range {
            next.auto_pause_time_range = v;
        }
        if let Some(v) = update.enable_detailed_logging {
            next.enable_detailed_logging = v;
        }
        if let Some(v) = update.show_resource_monitoring {
            next.show_resource_monitoring = v;
        }
        if let Some(v) = update.enable_performance_metrics {
            next.enable_performance_metrics = v;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Recurrence of scheduled scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleInterval {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Custom,
}

/// Local wall-clock time of a scheduled run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTime {
    pub hour: u32,
    pub minute: u32,
}

impl Default for ExecutionTime {
    fn default() -> Self {
        Self { hour: 3, minute: 0 }
    }
}

/// Schedule configuration for recurring scans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub enabled: bool,
    pub interval: ScheduleInterval,
    /// Only used by [`ScheduleInterval::Custom`]
    pub interval_hours: u32,
    pub execution_time: ExecutionTime,
    /// Days of week for weekly runs, 0 = Sunday
    pub weekly_days: Vec<u32>,
    /// Day of month for monthly runs (1-31, clamped to month length)
    pub monthly_day: u32,
    pub skip_if_running: bool,
    pub max_execution_time_minutes: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: ScheduleInterval::Daily,
            interval_hours: 24,
            execution_time: ExecutionTime::default(),
            weekly_days: vec![0],
            monthly_day: 1,
            skip_if_running: true,
            max_execution_time_minutes: 180,
        }
    }
}

impl ScheduleSettings {
    pub fn validate(&self) -> Result<()> {
        check_range("execution_time.hour", self.execution_time.hour, 0, 23)?;
        check_range("execution_time.minute", self.execution_time.minute, 0, 59)?;
        check_range("monthly_day", self.monthly_day, 1, 31)?;
        check_range("interval_hours", self.interval_hours, 1, 24 * 31)?;
        check_range("max_execution_time_minutes", self.max_execution_time_minutes, 30, 720)?;
        if self.interval == ScheduleInterval::Weekly && self.weekly_days.is_empty() {
            return Err(Error::InvalidInput(
                "weekly schedule needs at least one day".to_string(),
            ));
        }
        if let Some(day) = self.weekly_days.iter().find(|d| **d > 6) {
            return Err(Error::InvalidInput(format!(
                "weekly_days entries must be 0-6 (got {})",
                day
            )));
        }
        Ok(())
    }
}
