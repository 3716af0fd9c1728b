//! Scan orchestrator
//!
//! Owns the single active scan. A run moves through:
//!
//! DISCOVERY → PLAYLISTS → CHANGE DETECTION → METADATA → DEDUPLICATE → DATABASE
//!
//! Each stage lives in a `phase_*` module as an `impl ScanOrchestrator` block.
//! Percentages: metadata covers 0-50, database 50-100.

use chrono::Utc;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use vidcache_common::events::{EventBus, ScanPhase};
use vidcache_common::human_time::format_duration;
use vidcache_common::ids::generate_scan_id;
use vidcache_common::settings::{ScanSettings, ScanSettingsUpdate};

use super::control_channel::{ControlChannel, ControlHandle};
use super::resource_monitor::ResourceMonitor;
use super::scan_reporter::{ScanReporter, SharedRun};
use crate::db;
use crate::db::checkpoints::ScanCheckpoint;
use crate::error::{ScanError, ScanResult};
use crate::models::{ControlResult, ScanRun, ScanStatus};

mod phase_database;
mod phase_discovery;
mod phase_metadata;

const SCAN_TYPE_FULL: &str = "full";

/// Paths and tools a scan needs
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub video_roots: Vec<PathBuf>,
    pub ffprobe_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub thumbnail_dir: PathBuf,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Counts reported by the final `complete` event
#[derive(Debug, Default)]
struct RunSummary {
    total_files: usize,
    new_files: usize,
    changed_files: usize,
    deleted: usize,
}

/// Releases the run slot if the scan task stops before its normal release
///
/// Dropped on every exit of `execute`, including a panic in a phase or the
/// task being aborted. Disarmed once the normal path has released the slot.
struct RunSlotGuard {
    orchestrator: Arc<ScanOrchestrator>,
    reporter: Arc<ScanReporter>,
    scan_id: String,
    armed: bool,
}

impl RunSlotGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RunSlotGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let message = "Scan task stopped unexpectedly".to_string();
        self.orchestrator.release(&self.scan_id);
        *self.orchestrator.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.clone());
        tracing::error!(scan_id = %self.scan_id, "Scan task stopped before finishing, run slot released");
        self.reporter.error("Scan failed", message);
    }
}

/// Scan orchestrator service
pub struct ScanOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    config: OrchestratorConfig,
    settings: RwLock<ScanSettings>,
    run: SharedRun,
    control: Mutex<Option<ControlChannel>>,
    resources: Arc<ResourceMonitor>,
    last_error: Mutex<Option<String>>,
}

impl ScanOrchestrator {
    pub fn new(db: SqlitePool, event_bus: EventBus, config: OrchestratorConfig, settings: ScanSettings) -> Self {
        Self {
            db,
            event_bus,
            config,
            settings: RwLock::new(settings),
            run: Arc::new(Mutex::new(None)),
            control: Mutex::new(None),
            resources: Arc::new(ResourceMonitor::new()),
            last_error: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn is_scanning(&self) -> bool {
        self.run.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Message of the most recent scan-fatal failure
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Start a scan in the background and return its id
    ///
    /// Fails with [`ScanError::AlreadyRunning`] while another scan is active.
    pub async fn start_scan(self: &Arc<Self>) -> ScanResult<String> {
        self.launch().await.map(|(scan_id, _)| scan_id)
    }

    /// Like [`start_scan`](Self::start_scan), also handing back the run task
    pub async fn launch(self: &Arc<Self>) -> ScanResult<(String, JoinHandle<ScanOutcome>)> {
        let settings = self.settings.read().await.clone();

        let (scan_id, control) = {
            let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(active) = run.as_ref() {
                return Err(ScanError::AlreadyRunning(active.scan_id.clone()));
            }
            let scan_id = generate_scan_id();
            let channel = ControlChannel::new(scan_id.clone());
            let handle = channel.handle();
            *run = Some(ScanRun::new(scan_id.clone()));
            *self.control.lock().unwrap_or_else(PoisonError::into_inner) = Some(channel);
            (scan_id, handle)
        };

        self.event_bus.clear_last_event();
        self.resources.reset_memory_history();
        tracing::info!(scan_id = %scan_id, roots = self.config.video_roots.len(), "Scan started");

        let orchestrator = Arc::clone(self);
        let task_scan_id = scan_id.clone();
        let handle = tokio::spawn(async move { orchestrator.execute(task_scan_id, control, settings).await });

        Ok((scan_id, handle))
    }

    /// Apply `f` to the control channel of `scan_id`
    fn with_control(&self, scan_id: &str, f: impl FnOnce(&ControlChannel, &mut ScanRun) -> ControlResult) -> ControlResult {
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        let control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        match (run.as_mut(), control.as_ref()) {
            (Some(run), Some(control)) if run.scan_id == scan_id && control.scan_id() == scan_id => f(control, run),
            (Some(run), _) => ControlResult::rejected(format!(
                "Scan id mismatch: {} is not the active scan ({})",
                scan_id, run.scan_id
            )),
            _ => ControlResult::rejected("No scan is running"),
        }
    }

    pub fn pause_scan(&self, scan_id: &str) -> ControlResult {
        self.with_control(scan_id, |control, run| {
            if control.state().paused {
                return ControlResult::ok("Scan already paused");
            }
            control.pause();
            run.is_paused = true;
            tracing::info!(scan_id, "Scan paused");
            ControlResult::ok("Scan paused")
        })
    }

    pub fn resume_scan(&self, scan_id: &str) -> ControlResult {
        self.with_control(scan_id, |control, run| {
            if !control.state().paused {
                return ControlResult::ok("Scan is not paused");
            }
            control.resume();
            run.is_paused = false;
            tracing::info!(scan_id, "Scan resumed");
            ControlResult::ok("Scan resumed")
        })
    }

    pub fn cancel_scan(&self, scan_id: &str) -> ControlResult {
        self.with_control(scan_id, |control, run| {
            control.cancel();
            run.is_paused = false;
            tracing::info!(scan_id, "Scan cancellation requested");
            ControlResult::ok("Scan cancellation requested")
        })
    }

    pub async fn status(&self) -> ScanResult<ScanStatus> {
        let run = self.run.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let last_scan_completed_at = db::settings::get_last_scan_completed_at(&self.db).await?;
        let total_videos = db::videos::count_videos(&self.db).await?;
        let checkpoint = db::checkpoints::checkpoint_info(&self.db).await?;

        Ok(match run {
            Some(run) => ScanStatus {
                is_scanning: true,
                is_paused: run.is_paused,
                scan_id: Some(run.scan_id),
                phase: Some(run.phase),
                progress: run.progress,
                message: run.message,
                processed_files: run.processed_files,
                total_files: run.total_files,
                started_at: Some(run.started_at),
                last_scan_completed_at,
                total_videos,
                checkpoint,
            },
            None => ScanStatus {
                is_scanning: false,
                is_paused: false,
                scan_id: None,
                phase: None,
                progress: 0,
                message: "Idle".to_string(),
                processed_files: 0,
                total_files: 0,
                started_at: None,
                last_scan_completed_at,
                total_videos,
                checkpoint,
            },
        })
    }

    pub async fn settings(&self) -> ScanSettings {
        self.settings.read().await.clone()
    }

    /// Merge, validate and persist a partial update
    ///
    /// A running scan keeps the settings it started with.
    pub async fn update_settings(&self, update: ScanSettingsUpdate) -> vidcache_common::Result<ScanSettings> {
        let mut settings = self.settings.write().await;
        let next = settings.merged(update)?;
        db::settings::save_scan_settings(&self.db, &next).await?;
        *settings = next.clone();
        tracing::info!(batch_size = next.batch_size, concurrency = next.max_concurrent_operations, "Scan settings updated");
        Ok(next)
    }

    pub async fn reset_settings(&self) -> vidcache_common::Result<ScanSettings> {
        let mut settings = self.settings.write().await;
        let defaults = ScanSettings::default();
        db::settings::save_scan_settings(&self.db, &defaults).await?;
        *settings = defaults.clone();
        tracing::info!("Scan settings reset to defaults");
        Ok(defaults)
    }

    async fn execute(self: Arc<Self>, scan_id: String, mut control: ControlHandle, settings: ScanSettings) -> ScanOutcome {
        let started = Instant::now();
        let reporter = Arc::new(ScanReporter::new(
            scan_id.clone(),
            self.event_bus.clone(),
            Arc::clone(&self.run),
        ));
        let mut guard = RunSlotGuard {
            orchestrator: Arc::clone(&self),
            reporter: Arc::clone(&reporter),
            scan_id: scan_id.clone(),
            armed: true,
        };

        let result = self.run_phases(&scan_id, &settings, &reporter, &mut control).await;

        let outcome = match &result {
            Ok(_) => {
                if let Err(e) = db::checkpoints::invalidate_checkpoint(&self.db).await {
                    tracing::warn!(scan_id = %scan_id, error = %e, "Failed to invalidate checkpoint");
                }
                if let Err(e) = db::settings::set_last_scan_completed_at(&self.db, Utc::now()).await {
                    tracing::warn!(scan_id = %scan_id, error = %e, "Failed to record scan completion time");
                }
                ScanOutcome::Completed
            }
            Err(e) if e.is_cancelled() => ScanOutcome::Cancelled,
            Err(e) => {
                *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
                ScanOutcome::Failed(e.to_string())
            }
        };

        self.release(&scan_id);
        guard.disarm();
        self.persist_settings(&scan_id).await;

        // Terminal events go out after the run slot is released
        match result {
            Ok(summary) => {
                tracing::info!(
                    scan_id = %scan_id,
                    total_files = summary.total_files,
                    new_files = summary.new_files,
                    changed_files = summary.changed_files,
                    deleted = summary.deleted,
                    elapsed = %format_duration(started.elapsed().as_secs()),
                    "Scan completed"
                );
                reporter.complete(
                    summary.total_files,
                    summary.total_files,
                    format!(
                        "Scan complete: {} new, {} changed, {} removed",
                        summary.new_files, summary.changed_files, summary.deleted
                    ),
                );
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!(scan_id = %scan_id, elapsed = %format_duration(started.elapsed().as_secs()), "Scan cancelled");
                reporter.cancelled("Scan cancelled");
            }
            Err(e) => {
                tracing::error!(scan_id = %scan_id, error = %e, "Scan failed");
                reporter.error("Scan failed", e.to_string());
            }
        }

        outcome
    }

    async fn run_phases(
        &self,
        scan_id: &str,
        settings: &ScanSettings,
        reporter: &Arc<ScanReporter>,
        control: &mut ControlHandle,
    ) -> ScanResult<RunSummary> {
        reporter.phase(ScanPhase::Discovery, 0, 0, 0, "Discovering video files");
        self.checkpoint(scan_id, ScanPhase::Discovery, 0, 0).await;
        let candidates = self.phase_discovery(scan_id, control).await?;

        let assigner = self.phase_playlists(scan_id).await?;
        let changes = self.phase_changes(scan_id, reporter, candidates).await?;
        control.check().await?;

        let summary = RunSummary {
            total_files: changes.new_files.len() + changes.changed_files.len() + changes.unchanged_files.len(),
            new_files: changes.new_files.len(),
            changed_files: changes.changed_files.len(),
            deleted: changes.deleted_paths.len(),
        };

        let to_process = summary.new_files + summary.changed_files;
        reporter.phase(
            ScanPhase::Metadata,
            0,
            0,
            to_process,
            format!("Extracting metadata for {} files", to_process),
        );
        self.checkpoint(scan_id, ScanPhase::Metadata, 0, to_process).await;
        let metadata = self
            .phase_metadata(settings, reporter, control, changes, &assigner)
            .await?;
        let records = metadata.records;

        reporter.phase(
            ScanPhase::Database,
            50,
            0,
            records.len(),
            format!("Updating catalog with {} records", records.len()),
        );
        self.checkpoint(scan_id, ScanPhase::Database, 0, records.len()).await;
        let outcome = self
            .phase_database(settings, reporter, control, records, metadata.unreadable)
            .await?;

        Ok(RunSummary {
            deleted: outcome.deleted,
            ..summary
        })
    }

    /// Record the phase boundary; failures only cost diagnostics
    async fn checkpoint(&self, scan_id: &str, phase: ScanPhase, processed: usize, total: usize) {
        let mut checkpoint = ScanCheckpoint::new(scan_id, SCAN_TYPE_FULL, phase.as_str());
        checkpoint.processed_files = processed as i64;
        checkpoint.total_files = total as i64;
        if let Err(e) = db::checkpoints::save_checkpoint(&self.db, &checkpoint).await {
            tracing::warn!(scan_id, phase = phase.as_str(), error = %e, "Failed to save checkpoint");
        }
    }

    /// Clear the run and control slots if they still belong to `scan_id`
    fn release(&self, scan_id: &str) {
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        if run.as_ref().is_some_and(|r| r.scan_id == scan_id) {
            *run = None;
        }
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        if control.as_ref().is_some_and(|c| c.scan_id() == scan_id) {
            *control = None;
        }
    }

    /// Persist the settings in effect at the end of a run
    async fn persist_settings(&self, scan_id: &str) {
        let settings = self.settings.read().await.clone();
        if let Err(e) = db::settings::save_scan_settings(&self.db, &settings).await {
            tracing::warn!(scan_id, error = %e, "Failed to persist scan settings");
        }
    }
}
