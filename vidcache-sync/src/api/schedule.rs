//! Schedule API
//!
//! GET/PUT /api/schedule, GET /api/schedule/status

use axum::{extract::State, routing::get, Json, Router};
use vidcache_common::settings::ScheduleSettings;

use crate::config::{mirror_best_effort, TomlMirror};
use crate::services::SchedulerStatus;
use crate::{ApiResult, AppState};

/// GET /api/schedule
pub async fn get_schedule(State(state): State<AppState>) -> Json<ScheduleSettings> {
    Json(state.scheduler.settings().await)
}

/// PUT /api/schedule
///
/// Replaces the whole schedule; 400 when a value is out of range.
pub async fn update_schedule(
    State(state): State<AppState>,
    Json(settings): Json<ScheduleSettings>,
) -> ApiResult<Json<ScheduleSettings>> {
    let settings = state.scheduler.update_settings(settings).await?;
    mirror_best_effort(
        TomlMirror {
            scan: None,
            schedule: Some(settings.clone()),
        },
        state.config_path.as_deref(),
    )
    .await;
    Ok(Json(settings))
}

/// GET /api/schedule/status
pub async fn get_schedule_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status().await)
}

/// Build schedule routes
pub fn schedule_routes() -> Router<AppState> {
    Router::new()
        .route("/api/schedule", get(get_schedule).put(update_schedule))
        .route("/api/schedule/status", get(get_schedule_status))
}
