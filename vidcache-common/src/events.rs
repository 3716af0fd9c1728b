//! Scan progress events and the broadcast hub that fans them out
//!
//! Every event is serializable so the SSE layer can forward it verbatim.
//! The hub keeps exactly one cached event (the most recent) for late
//! subscribers; it is deliberately not a replay log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Scan phase reported in progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Discovery,
    Metadata,
    Database,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Discovery => "discovery",
            ScanPhase::Metadata => "metadata",
            ScanPhase::Database => "database",
        }
    }
}

/// Point-in-time view of a running scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub scan_id: String,
    pub phase: ScanPhase,
    /// Overall percentage, 0-100
    pub progress: u8,
    pub processed_files: usize,
    pub total_files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    pub message: String,
    /// Files per second over the recent window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_speed: Option<f64>,
    /// Seconds until the phase completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_elapsed_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phase_elapsed_seconds: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressSnapshot {
    /// Snapshot without throughput figures
    pub fn new(
        scan_id: impl Into<String>,
        phase: ScanPhase,
        progress: u8,
        processed_files: usize,
        total_files: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            scan_id: scan_id.into(),
            phase,
            progress: progress.min(100),
            processed_files,
            total_files,
            current_file: None,
            message: message.into(),
            processing_speed: None,
            estimated_time_remaining: None,
            phase_start_time: None,
            total_elapsed_seconds: None,
            current_phase_elapsed_seconds: None,
            timestamp: Utc::now(),
        }
    }
}

/// Incremental-scan breakdown reported after change detection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipStats {
    pub total_files: usize,
    pub new_files: usize,
    pub changed_files: usize,
    pub unchanged_files: usize,
    pub deleted_files: usize,
    /// Share of unchanged files, rounded to a whole percent
    pub unchanged_percentage: u8,
}

impl SkipStats {
    pub fn new(new_files: usize, changed_files: usize, unchanged_files: usize, deleted_files: usize) -> Self {
        let total_files = new_files + changed_files + unchanged_files;
        let unchanged_percentage = if total_files > 0 {
            ((unchanged_files as f64 / total_files as f64) * 100.0).round() as u8
        } else {
            0
        };
        Self {
            total_files,
            new_files,
            changed_files,
            unchanged_files,
            deleted_files,
            unchanged_percentage,
        }
    }
}

/// Events pushed to progress subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// Acknowledgement sent once per new subscriber
    Connected {
        connection_id: Uuid,
        active_connections: usize,
        timestamp: DateTime<Utc>,
    },

    /// Periodic per-file progress
    Progress(ProgressSnapshot),

    /// A phase boundary was crossed
    Phase(ProgressSnapshot),

    /// Successful terminal state; always the last event of a run
    Complete(ProgressSnapshot),

    /// Terminal state after a user or scheduler cancel
    Cancelled(ProgressSnapshot),

    /// Terminal state after a scan-fatal failure
    Error {
        #[serde(flatten)]
        snapshot: ProgressSnapshot,
        error: String,
    },

    /// New/changed/unchanged breakdown
    ScanStats {
        scan_id: String,
        skip_stats: SkipStats,
        timestamp: DateTime<Utc>,
    },

    /// Keep-alive carrying the live subscriber count
    Heartbeat {
        active_connections: usize,
        timestamp: DateTime<Utc>,
    },
}

impl ScanEvent {
    /// Wire name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ScanEvent::Connected { .. } => "connected",
            ScanEvent::Progress(_) => "progress",
            ScanEvent::Phase(_) => "phase",
            ScanEvent::Complete(_) => "complete",
            ScanEvent::Cancelled(_) => "cancelled",
            ScanEvent::Error { .. } => "error",
            ScanEvent::ScanStats { .. } => "scan_stats",
            ScanEvent::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Progress snapshot carried by scan-scoped events
    pub fn snapshot(&self) -> Option<&ProgressSnapshot> {
        match self {
            ScanEvent::Progress(s)
            | ScanEvent::Phase(s)
            | ScanEvent::Complete(s)
            | ScanEvent::Cancelled(s) => Some(s),
            ScanEvent::Error { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }

    /// Complete, cancelled or error
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanEvent::Complete(_) | ScanEvent::Cancelled(_) | ScanEvent::Error { .. }
        )
    }
}

/// Process-wide fan-out point for scan events
///
/// Closed subscribers are pruned by the underlying broadcast channel the
/// next time an event is sent, so `subscriber_count` only counts live ones.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
    last_event: Arc<RwLock<Option<ScanEvent>>>,
}

impl EventBus {
    /// Create a new bus; `capacity` bounds how far a slow subscriber may lag
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            last_event: Arc::new(RwLock::new(None)),
        }
    }

    /// Subscribe and receive the cached last event for replay
    ///
    /// The cache lock is held across the subscription so an event is either
    /// in the returned replay slot or delivered through the receiver, never
    /// both and never neither.
    pub fn subscribe(&self) -> (broadcast::Receiver<ScanEvent>, Option<ScanEvent>) {
        let guard = self.last_event.read().unwrap_or_else(PoisonError::into_inner);
        let rx = self.tx.subscribe();
        (rx, guard.clone())
    }

    /// Cache `event` and send it to every live subscriber
    ///
    /// Returns the number of subscribers reached (0 when nobody listens).
    pub fn broadcast(&self, event: ScanEvent) -> usize {
        let mut guard = self.last_event.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(event.clone());
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                tracing::trace!("Event broadcast with no subscribers");
                0
            }
        }
    }

    pub fn last_event(&self) -> Option<ScanEvent> {
        self.last_event
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget the cached event so new subscribers start clean
    pub fn clear_last_event(&self) {
        *self.last_event.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(scan_id: &str, pct: u8) -> ScanEvent {
        ScanEvent::Progress(ProgressSnapshot::new(scan_id, ScanPhase::Metadata, pct, 1, 2, "working"))
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_last_event_only() {
        let bus = EventBus::new(16);
        bus.broadcast(progress("scan_a", 10));
        bus.broadcast(progress("scan_a", 20));

        let (_rx, replay) = bus.subscribe();
        let snapshot = replay.as_ref().and_then(|e| e.snapshot()).unwrap();
        assert_eq!(snapshot.progress, 20);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let bus = EventBus::new(16);
        let (mut rx1, _) = bus.subscribe();
        let (mut rx2, _) = bus.subscribe();

        assert_eq!(bus.broadcast(progress("scan_b", 5)), 2);
        assert_eq!(rx1.recv().await.unwrap().event_type(), "progress");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "progress");
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new(16);
        let (rx1, _) = bus.subscribe();
        let (_rx2, _) = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(bus.broadcast(progress("scan_c", 1)), 1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_clear_last_event() {
        let bus = EventBus::new(4);
        bus.broadcast(progress("scan_d", 50));
        bus.clear_last_event();
        assert!(bus.last_event().is_none());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(progress("scan_e", 42)).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["scan_id"], "scan_e");
        assert_eq!(json["phase"], "metadata");
        assert_eq!(json["progress"], 42);

        let error = ScanEvent::Error {
            snapshot: ProgressSnapshot::new("scan_e", ScanPhase::Database, 60, 0, 0, "failed"),
            error: "disk full".to_string(),
        };
        let json = serde_json::to_value(error).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"], "disk full");
        assert_eq!(json["scan_id"], "scan_e");
    }

    #[test]
    fn test_skip_stats_percentage() {
        let stats = SkipStats::new(1, 1, 2, 0);
        assert_eq!(stats.total_files, 4);
        assert_eq!(stats.unchanged_percentage, 50);
        assert_eq!(SkipStats::new(0, 0, 0, 3).unchanged_percentage, 0);
    }
}
