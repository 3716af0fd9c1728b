//! Scan control API handlers
//!
//! POST /api/scan/start, GET /api/scan/status,
//! POST /api/scan/{pause,resume,cancel}

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiResult,
    models::{ControlResult, ScanStatus},
    AppState,
};

/// POST /api/scan/start response
#[derive(Debug, Serialize)]
pub struct StartScanResponse {
    pub scan_id: String,
    pub message: String,
}

/// Body of pause/resume/cancel
#[derive(Debug, Deserialize)]
pub struct ScanControlRequest {
    pub scan_id: String,
}

/// POST /api/scan/start
///
/// 202 Accepted with the new scan id; 409 Conflict while a scan runs.
pub async fn start_scan(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<StartScanResponse>)> {
    let scan_id = state.orchestrator.start_scan().await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartScanResponse {
            scan_id,
            message: "Scan started".to_string(),
        }),
    ))
}

/// GET /api/scan/status
pub async fn get_scan_status(State(state): State<AppState>) -> ApiResult<Json<ScanStatus>> {
    Ok(Json(state.orchestrator.status().await?))
}

/// Rejected control requests answer 409 with the same body shape
fn control_response(result: ControlResult) -> (StatusCode, Json<ControlResult>) {
    let status = if result.success { StatusCode::OK } else { StatusCode::CONFLICT };
    (status, Json(result))
}

/// POST /api/scan/pause
pub async fn pause_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanControlRequest>,
) -> (StatusCode, Json<ControlResult>) {
    control_response(state.orchestrator.pause_scan(&request.scan_id))
}

/// POST /api/scan/resume
pub async fn resume_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanControlRequest>,
) -> (StatusCode, Json<ControlResult>) {
    control_response(state.orchestrator.resume_scan(&request.scan_id))
}

/// POST /api/scan/cancel
pub async fn cancel_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanControlRequest>,
) -> (StatusCode, Json<ControlResult>) {
    control_response(state.orchestrator.cancel_scan(&request.scan_id))
}

/// Build scan routes
pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/scan/start", post(start_scan))
        .route("/api/scan/status", get(get_scan_status))
        .route("/api/scan/pause", post(pause_scan))
        .route("/api/scan/resume", post(resume_scan))
        .route("/api/scan/cancel", post(cancel_scan))
        .route("/api/scan/events", get(super::scan_event_stream))
}
