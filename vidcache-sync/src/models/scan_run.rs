//! In-memory scan run state
//!
//! A `ScanRun` exists only while a scan is active; it is never persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use vidcache_common::events::{ProgressSnapshot, ScanPhase};

use crate::db::checkpoints::CheckpointInfo;

/// State of the single active scan
#[derive(Debug, Clone)]
pub struct ScanRun {
    pub scan_id: String,
    pub phase: ScanPhase,
    pub started_at: DateTime<Utc>,
    pub processed_files: usize,
    pub total_files: usize,
    pub progress: u8,
    pub message: String,
    pub is_paused: bool,
}

impl ScanRun {
    pub fn new(scan_id: String) -> Self {
        Self {
            scan_id,
            phase: ScanPhase::Discovery,
            started_at: Utc::now(),
            processed_files: 0,
            total_files: 0,
            progress: 0,
            message: "Starting scan".to_string(),
            is_paused: false,
        }
    }

    /// Mirror a broadcast snapshot; percentage never moves backwards
    pub fn apply_snapshot(&mut self, snapshot: &ProgressSnapshot) {
        self.phase = snapshot.phase;
        self.processed_files = snapshot.processed_files;
        self.total_files = snapshot.total_files;
        self.progress = self.progress.max(snapshot.progress);
        self.message = snapshot.message.clone();
    }
}

/// Response of pause/resume/cancel
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ControlResult {
    pub success: bool,
    pub message: String,
}

impl ControlResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// Status surface response
#[derive(Debug, Clone, Serialize)]
pub struct ScanStatus {
    pub is_scanning: bool,
    pub is_paused: bool,
    pub scan_id: Option<String>,
    pub phase: Option<ScanPhase>,
    pub progress: u8,
    pub message: String,
    pub processed_files: usize,
    pub total_files: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub last_scan_completed_at: Option<DateTime<Utc>>,
    pub total_videos: i64,
    /// Present when a failed or cancelled scan left a valid checkpoint
    pub checkpoint: Option<CheckpointInfo>,
}
