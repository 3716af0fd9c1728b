//! Pause/resume/cancel signalling for the active scan
//!
//! The orchestrator owns a [`ControlChannel`] per run; workers hold cloned
//! [`ControlHandle`]s and await state changes rather than polling.

use serde::Serialize;
use tokio::sync::watch;

use crate::error::ScanError;

/// Flags observed by pipeline workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub paused: bool,
    pub cancelled: bool,
}

/// Sending half, held by the orchestrator
#[derive(Debug)]
pub struct ControlChannel {
    scan_id: String,
    tx: watch::Sender<ControlState>,
}

impl ControlChannel {
    pub fn new(scan_id: impl Into<String>) -> Self {
        let (tx, _) = watch::channel(ControlState::default());
        Self {
            scan_id: scan_id.into(),
            tx,
        }
    }

    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn handle(&self) -> ControlHandle {
        ControlHandle {
            scan_id: self.scan_id.clone(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn state(&self) -> ControlState {
        *self.tx.borrow()
    }

    pub fn pause(&self) {
        self.tx.send_modify(|s| s.paused = true);
    }

    pub fn resume(&self) {
        self.tx.send_modify(|s| s.paused = false);
    }

    /// Cancellation wins over pause; a paused worker wakes up and exits
    pub fn cancel(&self) {
        self.tx.send_modify(|s| s.cancelled = true);
    }
}

/// Receiving half, cloned into every worker
#[derive(Debug, Clone)]
pub struct ControlHandle {
    scan_id: String,
    rx: watch::Receiver<ControlState>,
}

impl ControlHandle {
    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().cancelled
    }

    pub fn is_paused(&self) -> bool {
        self.rx.borrow().paused
    }

    /// Block while paused; fail once cancelled
    ///
    /// A dropped channel counts as cancelled.
    pub async fn check(&mut self) -> Result<(), ScanError> {
        let mut logged_pause = false;
        loop {
            let state = *self.rx.borrow_and_update();
            if state.cancelled {
                return Err(ScanError::Cancelled);
            }
            if !state.paused {
                if logged_pause {
                    tracing::debug!(scan_id = %self.scan_id, "Worker resumed");
                }
                return Ok(());
            }
            if !logged_pause {
                tracing::debug!(scan_id = %self.scan_id, "Worker paused");
                logged_pause = true;
            }
            if self.rx.changed().await.is_err() {
                return Err(ScanError::Cancelled);
            }
        }
    }

    /// Wait for a state change or the timeout, whichever comes first
    ///
    /// Used by throttling loops that must still react to cancellation.
    pub async fn wait_change(&mut self, timeout: std::time::Duration) -> Result<(), ScanError> {
        match tokio::time::timeout(timeout, self.rx.changed()).await {
            Ok(Err(_)) => Err(ScanError::Cancelled),
            _ if self.is_cancelled() => Err(ScanError::Cancelled),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_check_passes_when_running() {
        let channel = ControlChannel::new("scan_1");
        let mut handle = channel.handle();
        assert!(handle.check().await.is_ok());
    }

    #[tokio::test]
    async fn test_pause_blocks_until_resume() {
        let channel = ControlChannel::new("scan_1");
        channel.pause();
        let mut handle = channel.handle();

        let waiter = tokio::spawn(async move { handle.check().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        channel.resume();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_wakes_paused_worker() {
        let channel = ControlChannel::new("scan_1");
        channel.pause();
        let mut handle = channel.handle();

        let waiter = tokio::spawn(async move { handle.check().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ScanError::Cancelled)));
        assert!(channel.state().paused);
    }

    #[tokio::test]
    async fn test_dropped_channel_counts_as_cancelled() {
        let channel = ControlChannel::new("scan_1");
        channel.pause();
        let mut handle = channel.handle();
        drop(channel);
        assert!(matches!(handle.check().await, Err(ScanError::Cancelled)));
    }

    #[tokio::test]
    async fn test_wait_change_times_out() {
        let channel = ControlChannel::new("scan_1");
        let mut handle = channel.handle();
        assert!(handle.wait_change(Duration::from_millis(10)).await.is_ok());
        channel.cancel();
        assert!(handle.wait_change(Duration::from_millis(10)).await.is_err());
    }
}
