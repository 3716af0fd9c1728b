//! vidcache-sync library interface
//!
//! Exposes the catalog synchronization services and the HTTP router for the
//! binary and for integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use vidcache_common::events::EventBus;

use crate::services::{ScanOrchestrator, ScanScheduler};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Broadcast hub feeding the SSE stream
    pub event_bus: EventBus,
    pub orchestrator: Arc<ScanOrchestrator>,
    pub scheduler: Arc<ScanScheduler>,
    /// TOML file mirrored after settings changes (none in tests)
    pub config_path: Option<PathBuf>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        orchestrator: Arc<ScanOrchestrator>,
        scheduler: Arc<ScanScheduler>,
    ) -> Self {
        Self {
            db,
            event_bus,
            orchestrator,
            scheduler,
            config_path: None,
            startup_time: Utc::now(),
        }
    }

    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::scan_routes())
        .merge(api::settings_routes())
        .merge(api::schedule_routes())
        .merge(api::health_routes())
        .with_state(state)
}
