//! Recurring scan scheduler
//!
//! A background task wakes every [`SCHEDULE_CHECK_INTERVAL`], compares local
//! time with the next computed execution and starts a scan when it is due.
//! Scheduled runs that exceed `max_execution_time_minutes` are cancelled.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vidcache_common::settings::{ScheduleInterval, ScheduleSettings};

use super::scan_orchestrator::{ScanOrchestrator, ScanOutcome};
use crate::db;
use crate::error::ScanError;

pub const SCHEDULE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Result of the most recent scheduled execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Cancelled,
    Timeout,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub is_enabled: bool,
    pub is_running: bool,
    pub next_execution: Option<DateTime<Local>>,
    pub last_execution: Option<DateTime<Utc>>,
    pub last_execution_status: Option<ExecutionStatus>,
    pub current_execution_start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SchedulerState {
    next_execution: Option<NaiveDateTime>,
    is_running: bool,
    last_execution: Option<DateTime<Utc>>,
    last_execution_status: Option<ExecutionStatus>,
    current_execution_start_time: Option<DateTime<Utc>>,
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> Option<NaiveDateTime> {
    date.and_hms_opt(hour, minute, 0)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// First execution strictly after `after` (local wall-clock time)
pub fn next_execution(settings: &ScheduleSettings, after: NaiveDateTime) -> Option<NaiveDateTime> {
    let hour = settings.execution_time.hour;
    let minute = settings.execution_time.minute;
    let today = after.date();

    match settings.interval {
        ScheduleInterval::Daily => (0..=1)
            .filter_map(|offset| at(today + ChronoDuration::days(offset), hour, minute))
            .find(|candidate| *candidate > after),
        ScheduleInterval::Weekly => {
            let days: &[u32] = if settings.weekly_days.is_empty() { &[0] } else { &settings.weekly_days };
            (0..=7)
                .map(|offset| today + ChronoDuration::days(offset))
                .filter(|date| days.contains(&date.weekday().num_days_from_sunday()))
                .filter_map(|date| at(date, hour, minute))
                .find(|candidate| *candidate > after)
        }
        ScheduleInterval::Monthly => (0..=12).find_map(|offset| {
            let months = today.month0() + offset;
            let year = today.year() + (months / 12) as i32;
            let month = months % 12 + 1;
            let day = settings.monthly_day.clamp(1, days_in_month(year, month));
            NaiveDate::from_ymd_opt(year, month, day)
                .and_then(|date| at(date, hour, minute))
                .filter(|candidate| *candidate > after)
        }),
        // Every hour divisible by `interval_hours`, at the configured minute
        ScheduleInterval::Custom => {
            let step = settings.interval_hours.max(1);
            (0..=2)
                .map(|offset| today + ChronoDuration::days(offset))
                .flat_map(|date| (0..24).filter(move |h| h % step == 0).map(move |h| (date, h)))
                .filter_map(|(date, h)| at(date, h, minute))
                .find(|candidate| *candidate > after)
        }
    }
}

fn local(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    Local.from_local_datetime(&naive).earliest()
}

pub struct ScanScheduler {
    db: SqlitePool,
    orchestrator: Arc<ScanOrchestrator>,
    settings: RwLock<ScheduleSettings>,
    state: Mutex<SchedulerState>,
    shutdown: CancellationToken,
}

impl ScanScheduler {
    pub fn new(db: SqlitePool, orchestrator: Arc<ScanOrchestrator>, settings: ScheduleSettings) -> Self {
        let next = settings
            .enabled
            .then(|| next_execution(&settings, Local::now().naive_local()))
            .flatten();
        Self {
            db,
            orchestrator,
            settings: RwLock::new(settings),
            state: Mutex::new(SchedulerState {
                next_execution: next,
                ..Default::default()
            }),
            shutdown: CancellationToken::new(),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the check loop; it runs until [`shutdown`](Self::shutdown)
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!("Scan scheduler started");
            loop {
                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(SCHEDULE_CHECK_INTERVAL) => {
                        scheduler.tick(Local::now().naive_local()).await;
                    }
                }
            }
            tracing::info!("Scan scheduler stopped");
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn settings(&self) -> ScheduleSettings {
        self.settings.read().await.clone()
    }

    /// Validate, persist and apply new schedule settings
    pub async fn update_settings(&self, next: ScheduleSettings) -> vidcache_common::Result<ScheduleSettings> {
        next.validate()?;
        let mut settings = self.settings.write().await;
        db::settings::save_schedule_settings(&self.db, &next).await?;
        *settings = next.clone();

        let upcoming = next
            .enabled
            .then(|| next_execution(&next, Local::now().naive_local()))
            .flatten();
        self.lock_state().next_execution = upcoming;
        tracing::info!(enabled = next.enabled, interval = ?next.interval, next_execution = ?upcoming, "Schedule updated");
        Ok(next)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let enabled = self.settings.read().await.enabled;
        let state = self.lock_state();
        SchedulerStatus {
            is_enabled: enabled,
            is_running: state.is_running,
            next_execution: if enabled { state.next_execution.and_then(local) } else { None },
            last_execution: state.last_execution,
            last_execution_status: state.last_execution_status,
            current_execution_start_time: state.current_execution_start_time,
        }
    }

    /// Fire the scheduled scan if `now` has reached the next execution
    async fn tick(self: &Arc<Self>, now: NaiveDateTime) {
        let settings = self.settings.read().await.clone();
        if !settings.enabled {
            return;
        }

        let due = {
            let mut state = self.lock_state();
            match state.next_execution {
                Some(next) if next <= now => {
                    state.next_execution = next_execution(&settings, now);
                    true
                }
                Some(_) => false,
                None => {
                    state.next_execution = next_execution(&settings, now);
                    false
                }
            }
        };

        if due {
            tokio::spawn(Arc::clone(self).run_scheduled(settings));
        }
    }

    fn record(&self, started: DateTime<Utc>, status: ExecutionStatus) {
        let mut state = self.lock_state();
        state.is_running = false;
        state.current_execution_start_time = None;
        state.last_execution = Some(started);
        state.last_execution_status = Some(status);
    }

    async fn run_scheduled(self: Arc<Self>, settings: ScheduleSettings) {
        let started = Utc::now();

        if settings.skip_if_running && self.orchestrator.is_scanning() {
            tracing::info!("Scheduled scan skipped, a scan is already running");
            self.record(started, ExecutionStatus::Skipped);
            return;
        }

        let (scan_id, mut handle) = match self.orchestrator.launch().await {
            Ok(launched) => launched,
            Err(ScanError::AlreadyRunning(active)) => {
                tracing::warn!(active_scan = %active, "Scheduled scan could not start");
                self.record(started, ExecutionStatus::Failed);
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduled scan failed to start");
                self.record(started, ExecutionStatus::Failed);
                return;
            }
        };

        {
            let mut state = self.lock_state();
            state.is_running = true;
            state.current_execution_start_time = Some(started);
        }
        tracing::info!(scan_id = %scan_id, "Scheduled scan started");

        let limit = Duration::from_secs(u64::from(settings.max_execution_time_minutes) * 60);
        let status = match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(ScanOutcome::Completed)) => ExecutionStatus::Completed,
            Ok(Ok(ScanOutcome::Cancelled)) => ExecutionStatus::Cancelled,
            Ok(Ok(ScanOutcome::Failed(_))) => ExecutionStatus::Failed,
            Ok(Err(e)) => {
                tracing::error!(scan_id = %scan_id, error = %e, "Scheduled scan task panicked");
                ExecutionStatus::Failed
            }
            Err(_) => {
                tracing::warn!(
                    scan_id = %scan_id,
                    max_minutes = settings.max_execution_time_minutes,
                    "Scheduled scan exceeded its time limit, cancelling"
                );
                self.orchestrator.cancel_scan(&scan_id);
                let _ = handle.await;
                ExecutionStatus::Timeout
            }
        };

        tracing::info!(scan_id = %scan_id, status = ?status, "Scheduled scan finished");
        self.record(started, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::services::scan_orchestrator::OrchestratorConfig;
    use std::path::PathBuf;
    use vidcache_common::events::EventBus;
    use vidcache_common::settings::{ExecutionTime, ScanSettings};

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    fn schedule(interval: ScheduleInterval) -> ScheduleSettings {
        ScheduleSettings {
            enabled: true,
            interval,
            execution_time: ExecutionTime { hour: 3, minute: 30 },
            ..Default::default()
        }
    }

    #[test]
    fn test_daily_rolls_to_tomorrow() {
        let settings = schedule(ScheduleInterval::Daily);
        assert_eq!(next_execution(&settings, dt(2026, 3, 10, 1, 0)), Some(dt(2026, 3, 10, 3, 30)));
        assert_eq!(next_execution(&settings, dt(2026, 3, 10, 3, 30)), Some(dt(2026, 3, 11, 3, 30)));
    }

    #[test]
    fn test_weekly_picks_next_listed_day() {
        // 2026-03-10 is a Tuesday
        let settings = ScheduleSettings {
            weekly_days: vec![0, 5],
            ..schedule(ScheduleInterval::Weekly)
        };
        assert_eq!(next_execution(&settings, dt(2026, 3, 10, 12, 0)), Some(dt(2026, 3, 13, 3, 30)));
        assert_eq!(next_execution(&settings, dt(2026, 3, 13, 4, 0)), Some(dt(2026, 3, 15, 3, 30)));
    }

    #[test]
    fn test_monthly_clamps_to_month_length() {
        let settings = ScheduleSettings {
            monthly_day: 31,
            ..schedule(ScheduleInterval::Monthly)
        };
        assert_eq!(next_execution(&settings, dt(2026, 2, 1, 0, 0)), Some(dt(2026, 2, 28, 3, 30)));
        assert_eq!(next_execution(&settings, dt(2026, 12, 31, 5, 0)), Some(dt(2027, 1, 31, 3, 30)));
    }

    #[test]
    fn test_custom_every_n_hours() {
        let settings = ScheduleSettings {
            interval_hours: 6,
            ..schedule(ScheduleInterval::Custom)
        };
        assert_eq!(next_execution(&settings, dt(2026, 3, 10, 7, 0)), Some(dt(2026, 3, 10, 12, 30)));
        assert_eq!(next_execution(&settings, dt(2026, 3, 10, 18, 45)), Some(dt(2026, 3, 11, 0, 30)));
    }

    async fn scheduler(root: PathBuf) -> Arc<ScanScheduler> {
        let db = test_pool().await;
        let orchestrator = Arc::new(ScanOrchestrator::new(
            db.clone(),
            EventBus::new(64),
            OrchestratorConfig {
                video_roots: vec![root.clone()],
                ffprobe_path: PathBuf::from("/nonexistent/ffprobe"),
                ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg"),
                thumbnail_dir: root.join("thumbs"),
            },
            ScanSettings::default(),
        ));
        Arc::new(ScanScheduler::new(db, orchestrator, schedule(ScheduleInterval::Daily)))
    }

    #[tokio::test]
    async fn test_scheduled_run_records_completion() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path().to_path_buf()).await;

        let settings = scheduler.settings().await;
        Arc::clone(&scheduler).run_scheduled(settings).await;

        let status = scheduler.status().await;
        assert!(status.is_enabled);
        assert!(!status.is_running);
        assert_eq!(status.last_execution_status, Some(ExecutionStatus::Completed));
        assert!(status.last_execution.is_some());
    }

    #[tokio::test]
    async fn test_scheduled_run_skips_while_scanning() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path().to_path_buf()).await;

        let (_, manual) = scheduler.orchestrator.launch().await.unwrap();
        let settings = scheduler.settings().await;
        Arc::clone(&scheduler).run_scheduled(settings).await;
        manual.await.unwrap();

        assert_eq!(
            scheduler.status().await.last_execution_status,
            Some(ExecutionStatus::Skipped)
        );
    }

    #[tokio::test]
    async fn test_update_settings_validates_and_reschedules() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path().to_path_buf()).await;

        let invalid = ScheduleSettings {
            monthly_day: 0,
            ..scheduler.settings().await
        };
        assert!(scheduler.update_settings(invalid).await.is_err());

        let disabled = ScheduleSettings {
            enabled: false,
            ..scheduler.settings().await
        };
        scheduler.update_settings(disabled).await.unwrap();
        let status = scheduler.status().await;
        assert!(!status.is_enabled);
        assert!(status.next_execution.is_none());
    }
}
