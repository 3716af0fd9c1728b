//! Connection pool monitoring utilities
//!
//! Instrumented transactions that log how long a pooled connection waited
//! and how long it was held, to spot long catalog batches.

use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::time::Instant;
use vidcache_common::{Error, Result};

/// Transaction wrapper that logs its hold time on commit, rollback or drop
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    /// Connection to run statements on
    pub fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| Error::Internal(format!("{}: transaction already finished", self.caller)))
    }

    /// Commit the transaction and log release timing
    pub async fn commit(mut self) -> Result<()> {
        let Some(tx) = self.tx.take() else {
            return Err(Error::Internal(format!("{}: transaction already finished", self.caller)));
        };
        tx.commit().await?;
        log_release(self.caller, self.acquired_at, "commit");
        Ok(())
    }

    /// Roll back the transaction and log release timing
    pub async fn rollback(mut self) -> Result<()> {
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };
        tx.rollback().await?;
        log_release(self.caller, self.acquired_at, "rollback");
        Ok(())
    }
}

impl<'c> Drop for MonitoredTransaction<'c> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx rolls back on drop; only the timing is ours to report
            log_release(self.caller, self.acquired_at, "drop");
        }
    }
}

fn log_release(caller: &'static str, acquired_at: Instant, how: &'static str) {
    let held_ms = acquired_at.elapsed().as_millis();
    if held_ms > 2000 {
        tracing::warn!(caller, held_ms, how, "Long transaction held a pooled connection");
    } else {
        tracing::debug!(caller, held_ms, how, "Connection released");
    }
}

/// Begin a monitored transaction with acquisition timing logs
pub async fn begin_monitored<'c>(
    pool: &'c sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();
    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        tracing::warn!(caller, wait_ms, "Slow connection acquisition, pool may be saturated");
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction {
        tx: Some(tx),
        caller,
        acquired_at: Instant::now(),
    })
}
