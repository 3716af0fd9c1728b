//! Throughput and ETA over a sliding window

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use vidcache_common::events::ProgressSnapshot;

/// Samples older than this are dropped before computing speed
pub const PROGRESS_WINDOW: Duration = Duration::from_secs(30);

/// Derived throughput figures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressMetrics {
    /// Files per second, two decimals
    pub processing_speed: f64,
    /// Seconds; `None` while speed is unknown
    pub estimated_time_remaining: Option<u64>,
    pub total_elapsed_seconds: u64,
    pub current_phase_elapsed_seconds: u64,
}

#[derive(Debug)]
pub struct ProgressCalculator {
    window: VecDeque<(Instant, usize)>,
    total_start: Option<Instant>,
    phase_start: Option<Instant>,
    phase_start_time: Option<DateTime<Utc>>,
}

impl ProgressCalculator {
    pub fn new() -> Self {
        Self {
            window: VecDeque::new(),
            total_start: None,
            phase_start: None,
            phase_start_time: None,
        }
    }

    /// Start the run clock (and the first phase clock)
    pub fn start_total_timer(&mut self) {
        self.total_start = Some(Instant::now());
        self.reset_phase_timer();
    }

    pub fn reset_phase_timer(&mut self) {
        self.phase_start = Some(Instant::now());
        self.phase_start_time = Some(Utc::now());
        self.window.clear();
    }

    pub fn phase_start_time(&self) -> Option<DateTime<Utc>> {
        self.phase_start_time
    }

    /// Record a sample and derive metrics
    pub fn calculate(&mut self, processed: usize, total: usize) -> ProgressMetrics {
        self.calculate_at(Instant::now(), processed, total)
    }

    fn calculate_at(&mut self, now: Instant, processed: usize, total: usize) -> ProgressMetrics {
        self.window.push_back((now, processed));
        while let Some(&(at, _)) = self.window.front() {
            if now.saturating_duration_since(at) > PROGRESS_WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }

        let mut speed = 0.0;
        if let (Some(&(t0, p0)), Some(&(t1, p1))) = (self.window.front(), self.window.back()) {
            let secs = t1.saturating_duration_since(t0).as_secs_f64();
            if secs > 0.0 && p1 >= p0 {
                speed = (p1 - p0) as f64 / secs;
            }
        }
        let speed = (speed * 100.0).round() / 100.0;

        let estimated_time_remaining = if speed > 0.0 {
            Some((total.saturating_sub(processed) as f64 / speed).round() as u64)
        } else {
            None
        };

        let elapsed = |start: Option<Instant>| {
            start
                .map(|s| now.saturating_duration_since(s).as_secs_f64().round() as u64)
                .unwrap_or(0)
        };

        ProgressMetrics {
            processing_speed: speed,
            estimated_time_remaining,
            total_elapsed_seconds: elapsed(self.total_start),
            current_phase_elapsed_seconds: elapsed(self.phase_start),
        }
    }

    /// Fill the throughput fields of a snapshot
    pub fn annotate(&mut self, snapshot: &mut ProgressSnapshot) {
        let metrics = self.calculate(snapshot.processed_files, snapshot.total_files);
        snapshot.processing_speed = Some(metrics.processing_speed);
        snapshot.estimated_time_remaining = metrics.estimated_time_remaining;
        snapshot.phase_start_time = self.phase_start_time;
        snapshot.total_elapsed_seconds = Some(metrics.total_elapsed_seconds);
        snapshot.current_phase_elapsed_seconds = Some(metrics.current_phase_elapsed_seconds);
    }

    /// Forget all samples and clocks
    pub fn reset(&mut self) {
        self.window.clear();
        self.total_start = None;
        self.phase_start = None;
        self.phase_start_time = None;
    }
}

impl Default for ProgressCalculator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_and_eta() {
        let mut calc = ProgressCalculator::new();
        let t0 = Instant::now();
        calc.calculate_at(t0, 0, 100);
        let metrics = calc.calculate_at(t0 + Duration::from_secs(10), 30, 100);

        assert_eq!(metrics.processing_speed, 3.0);
        assert_eq!(metrics.estimated_time_remaining, Some(23));
    }

    #[test]
    fn test_single_sample_has_no_eta() {
        let mut calc = ProgressCalculator::new();
        let metrics = calc.calculate(5, 10);
        assert_eq!(metrics.processing_speed, 0.0);
        assert_eq!(metrics.estimated_time_remaining, None);
    }

    #[test]
    fn test_old_samples_leave_window() {
        let mut calc = ProgressCalculator::new();
        let t0 = Instant::now();
        calc.calculate_at(t0, 0, 1000);
        calc.calculate_at(t0 + Duration::from_secs(40), 400, 1000);
        let metrics = calc.calculate_at(t0 + Duration::from_secs(50), 500, 1000);

        // Only the last two samples remain: 100 files in 10 s
        assert_eq!(metrics.processing_speed, 10.0);
        assert_eq!(metrics.estimated_time_remaining, Some(50));
    }

    #[test]
    fn test_reset_clears_clocks() {
        let mut calc = ProgressCalculator::new();
        calc.start_total_timer();
        assert!(calc.phase_start_time().is_some());
        calc.reset();
        assert!(calc.phase_start_time().is_none());
        assert_eq!(calc.calculate(1, 2).total_elapsed_seconds, 0);
    }
}
