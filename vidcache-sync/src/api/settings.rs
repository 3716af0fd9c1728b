//! Scan settings API
//!
//! GET/PUT /api/settings/scan, POST /api/settings/scan/reset
//!
//! **Behavior:**
//! 1. Validate against the documented ranges (400 on violation)
//! 2. Write to database (authoritative)
//! 3. Sync to TOML (best-effort backup)
//!
//! A running scan keeps the settings it started with.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use vidcache_common::settings::{ScanSettings, ScanSettingsUpdate};

use crate::config::{mirror_best_effort, TomlMirror};
use crate::{ApiResult, AppState};

/// GET /api/settings/scan
pub async fn get_scan_settings(State(state): State<AppState>) -> Json<ScanSettings> {
    Json(state.orchestrator.settings().await)
}

/// PUT /api/settings/scan
///
/// **Request:** any subset of the settings fields
/// **Response:** the full settings after the merge
pub async fn update_scan_settings(
    State(state): State<AppState>,
    Json(update): Json<ScanSettingsUpdate>,
) -> ApiResult<Json<ScanSettings>> {
    let settings = state.orchestrator.update_settings(update).await?;
    mirror_best_effort(
        TomlMirror {
            scan: Some(settings.clone()),
            schedule: None,
        },
        state.config_path.as_deref(),
    )
    .await;
    Ok(Json(settings))
}

/// POST /api/settings/scan/reset
pub async fn reset_scan_settings(State(state): State<AppState>) -> ApiResult<Json<ScanSettings>> {
    let settings = state.orchestrator.reset_settings().await?;
    mirror_best_effort(
        TomlMirror {
            scan: Some(settings.clone()),
            schedule: None,
        },
        state.config_path.as_deref(),
    )
    .await;
    Ok(Json(settings))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/settings/scan",
            get(get_scan_settings).put(update_scan_settings),
        )
        .route("/api/settings/scan/reset", post(reset_scan_settings))
}
