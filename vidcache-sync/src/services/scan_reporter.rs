//! Event emission for one scan run
//!
//! Every event of a run goes through the reporter: the in-memory `ScanRun`
//! mirrors what subscribers see, and the percentage never moves backwards.
//! Terminal events carry the last reported counts even after the run slot
//! has been cleared.

use std::sync::{Arc, Mutex, PoisonError};

use vidcache_common::events::{EventBus, ProgressSnapshot, ScanEvent, ScanPhase, SkipStats};
use vidcache_common::human_time::format_eta;

use super::progress_calculator::ProgressCalculator;
use crate::models::ScanRun;

/// Slot holding the active run, shared with the orchestrator
pub type SharedRun = Arc<Mutex<Option<ScanRun>>>;

struct ReporterState {
    calculator: ProgressCalculator,
    last_progress: u8,
    processed: usize,
    total: usize,
    phase: ScanPhase,
}

pub struct ScanReporter {
    scan_id: String,
    event_bus: EventBus,
    run: SharedRun,
    state: Mutex<ReporterState>,
}

impl ScanReporter {
    pub fn new(scan_id: impl Into<String>, event_bus: EventBus, run: SharedRun) -> Self {
        let mut calculator = ProgressCalculator::new();
        calculator.start_total_timer();
        Self {
            scan_id: scan_id.into(),
            event_bus,
            run,
            state: Mutex::new(ReporterState {
                calculator,
                last_progress: 0,
                processed: 0,
                total: 0,
                phase: ScanPhase::Discovery,
            }),
        }
    }

    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn last_progress(&self) -> u8 {
        self.lock_state().last_progress
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mirror(&self, snapshot: &ProgressSnapshot) {
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = run.as_mut().filter(|r| r.scan_id == self.scan_id) {
            run.apply_snapshot(snapshot);
        }
    }

    fn snapshot(
        &self,
        state: &mut ReporterState,
        progress: u8,
        processed: usize,
        total: usize,
        message: String,
    ) -> ProgressSnapshot {
        state.last_progress = state.last_progress.max(progress.min(100));
        state.processed = processed;
        state.total = total;
        let mut snapshot = ProgressSnapshot::new(
            self.scan_id.clone(),
            state.phase,
            state.last_progress,
            processed,
            total,
            message,
        );
        state.calculator.annotate(&mut snapshot);
        snapshot
    }

    /// Enter a new phase and announce it
    pub fn phase(&self, phase: ScanPhase, progress: u8, processed: usize, total: usize, message: impl Into<String>) {
        let mut state = self.lock_state();
        state.phase = phase;
        state.calculator.reset_phase_timer();
        let snapshot = self.snapshot(&mut state, progress, processed, total, message.into());
        tracing::info!(
            scan_id = %self.scan_id,
            phase = phase.as_str(),
            progress = snapshot.progress,
            "{}",
            snapshot.message
        );
        self.mirror(&snapshot);
        self.event_bus.broadcast(ScanEvent::Phase(snapshot));
    }

    /// Per-file or per-batch progress within the current phase
    pub fn progress(
        &self,
        progress: u8,
        processed: usize,
        total: usize,
        current_file: Option<String>,
        message: impl Into<String>,
    ) {
        let mut state = self.lock_state();
        let mut snapshot = self.snapshot(&mut state, progress, processed, total, message.into());
        snapshot.current_file = current_file;
        tracing::debug!(
            scan_id = %self.scan_id,
            progress = snapshot.progress,
            eta = %format_eta(snapshot.estimated_time_remaining),
            "{}",
            snapshot.message
        );
        self.mirror(&snapshot);
        self.event_bus.broadcast(ScanEvent::Progress(snapshot));
    }

    pub fn scan_stats(&self, skip_stats: SkipStats) {
        self.event_bus.broadcast(ScanEvent::ScanStats {
            scan_id: self.scan_id.clone(),
            skip_stats,
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn complete(&self, processed: usize, total: usize, message: impl Into<String>) {
        let mut state = self.lock_state();
        let snapshot = self.snapshot(&mut state, 100, processed, total, message.into());
        self.mirror(&snapshot);
        self.event_bus.broadcast(ScanEvent::Complete(snapshot));
    }

    pub fn cancelled(&self, message: impl Into<String>) {
        let mut state = self.lock_state();
        let (processed, total) = (state.processed, state.total);
        let snapshot = self.snapshot(&mut state, 0, processed, total, message.into());
        self.event_bus.broadcast(ScanEvent::Cancelled(snapshot));
    }

    pub fn error(&self, message: impl Into<String>, error: impl Into<String>) {
        let mut state = self.lock_state();
        let (processed, total) = (state.processed, state.total);
        let snapshot = self.snapshot(&mut state, 0, processed, total, message.into());
        self.event_bus.broadcast(ScanEvent::Error {
            snapshot,
            error: error.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let bus = EventBus::new(16);
        let (mut rx, _) = bus.subscribe();
        let run: SharedRun = Arc::new(Mutex::new(Some(ScanRun::new("scan_1".into()))));
        let reporter = ScanReporter::new("scan_1", bus, run.clone());

        reporter.phase(ScanPhase::Metadata, 0, 0, 4, "Extracting metadata");
        reporter.progress(40, 2, 4, None, "2/4");
        reporter.progress(25, 1, 4, None, "late chunk");

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(rx.recv().await.unwrap().snapshot().unwrap().progress);
        }
        assert_eq!(seen, vec![0, 40, 40]);
        assert_eq!(run.lock().unwrap().as_ref().unwrap().progress, 40);
    }

    #[tokio::test]
    async fn test_complete_is_terminal_and_full() {
        let bus = EventBus::new(16);
        let run: SharedRun = Arc::new(Mutex::new(None));
        let reporter = ScanReporter::new("scan_1", bus.clone(), run);

        reporter.complete(3, 3, "done");
        let last = bus.last_event().unwrap();
        assert!(last.is_terminal());
        let snapshot = last.snapshot().unwrap();
        assert_eq!(snapshot.progress, 100);
        assert_eq!(snapshot.processed_files, 3);
    }

    #[tokio::test]
    async fn test_foreign_run_is_not_mirrored() {
        let bus = EventBus::new(16);
        let run: SharedRun = Arc::new(Mutex::new(Some(ScanRun::new("scan_other".into()))));
        let reporter = ScanReporter::new("scan_1", bus, run.clone());

        reporter.progress(30, 1, 2, None, "x");
        assert_eq!(run.lock().unwrap().as_ref().unwrap().progress, 0);
    }

    #[tokio::test]
    async fn test_cancelled_keeps_last_counts() {
        let bus = EventBus::new(16);
        let run: SharedRun = Arc::new(Mutex::new(None));
        let reporter = ScanReporter::new("scan_1", bus.clone(), run);

        reporter.progress(20, 4, 10, None, "4/10");
        reporter.cancelled("Scan cancelled");

        match bus.last_event() {
            Some(ScanEvent::Cancelled(snapshot)) => {
                assert_eq!(snapshot.processed_files, 4);
                assert_eq!(snapshot.total_files, 10);
                assert_eq!(snapshot.progress, 20);
            }
            other => panic!("expected cancelled event, got {:?}", other),
        }
    }
}
