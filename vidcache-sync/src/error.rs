//! Error types for vidcache-sync

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. scan already running or scan id mismatch
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// vidcache-common error
    #[error("Common error: {0}")]
    Common(vidcache_common::Error),
}

impl From<vidcache_common::Error> for ApiError {
    fn from(err: vidcache_common::Error) -> Self {
        match err {
            vidcache_common::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            vidcache_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Common(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Scan-level failures
///
/// `Cancelled` is a terminal state, not a failure: the orchestrator turns it
/// into a `cancelled` event instead of an `error` event.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Scan already running: {0}")]
    AlreadyRunning(String),

    #[error("Scan cancelled")]
    Cancelled,

    #[error(transparent)]
    Common(#[from] vidcache_common::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled)
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::AlreadyRunning(scan_id) => {
                ApiError::Conflict(format!("Scan already running: {}", scan_id))
            }
            ScanError::Common(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

pub type ScanResult<T> = Result<T, ScanError>;
