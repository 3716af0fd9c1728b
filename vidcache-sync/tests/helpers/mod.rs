//! Test helper utilities
//!
//! Shared setup for the vidcache-sync integration tests: in-memory catalog,
//! temp video roots and an event collector.

#![allow(dead_code)]

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

use vidcache_common::events::{EventBus, ScanEvent};
use vidcache_common::settings::{ScanSettings, ScheduleSettings};
use vidcache_sync::services::{OrchestratorConfig, ScanOrchestrator, ScanScheduler};
use vidcache_sync::AppState;

/// Everything a test needs, kept alive together
pub struct TestEnv {
    pub dir: TempDir,
    pub video_root: PathBuf,
    pub thumbnail_dir: PathBuf,
    pub pool: SqlitePool,
    pub event_bus: EventBus,
    pub orchestrator: Arc<ScanOrchestrator>,
    pub scheduler: Arc<ScanScheduler>,
}

impl TestEnv {
    pub fn state(&self) -> AppState {
        AppState::new(
            self.pool.clone(),
            self.event_bus.clone(),
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.scheduler),
        )
    }

    pub fn app(&self) -> axum::Router {
        vidcache_sync::build_router(self.state())
    }
}

/// Single-connection in-memory pool (each connection would be a new database)
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    vidcache_sync::db::init_tables(&pool)
        .await
        .expect("Failed to initialize schema");
    pool
}

/// Environment scanning one temp root
pub async fn create_test_env() -> TestEnv {
    create_test_env_with(|root| vec![root.to_path_buf()], ScanSettings::default()).await
}

/// Environment with custom roots (derived from the temp root) and settings
pub async fn create_test_env_with(
    roots: impl FnOnce(&Path) -> Vec<PathBuf>,
    settings: ScanSettings,
) -> TestEnv {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let video_root = dir.path().join("videos");
    let thumbnail_dir = dir.path().join("thumbnails");
    std::fs::create_dir_all(&video_root).unwrap();
    std::fs::create_dir_all(&thumbnail_dir).unwrap();

    let pool = create_test_pool().await;
    let event_bus = EventBus::new(1024);
    let orchestrator = Arc::new(ScanOrchestrator::new(
        pool.clone(),
        event_bus.clone(),
        OrchestratorConfig {
            video_roots: roots(&video_root),
            ffprobe_path: PathBuf::from("/nonexistent/ffprobe"),
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg"),
            thumbnail_dir: thumbnail_dir.clone(),
        },
        settings,
    ));
    let scheduler = Arc::new(ScanScheduler::new(
        pool.clone(),
        Arc::clone(&orchestrator),
        ScheduleSettings::default(),
    ));

    TestEnv {
        dir,
        video_root,
        thumbnail_dir,
        pool,
        event_bus,
        orchestrator,
        scheduler,
    }
}

/// Write a fake video file of `size` bytes
pub fn write_video(dir: &Path, name: &str, size: usize) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, vec![0u8; size]).unwrap();
    path
}

/// Receive events until a terminal one arrives
pub async fn collect_until_terminal(rx: &mut broadcast::Receiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("Timed out waiting for scan events")
            .expect("Event bus closed");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}
