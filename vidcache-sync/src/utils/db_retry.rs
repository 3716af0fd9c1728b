//! Retry of catalog writes that hit a locked SQLite database
//!
//! Only `database is locked` failures are retried. Anything else, and the
//! last lock error once the wait limit is spent, goes back to the caller.

use std::future::Future;
use std::time::{Duration, Instant};
use vidcache_common::Result;

/// Default wait limit for lock retries
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Doubling delays, capped at [`MAX_BACKOFF`]
struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self { next: INITIAL_BACKOFF }
    }

    fn step(&mut self) -> Duration {
        let current = self.next;
        self.next = (current * 2).min(MAX_BACKOFF);
        current
    }
}

/// Run `operation` until it succeeds, fails with a non-lock error, or
/// `max_wait_ms` has elapsed
pub async fn retry_on_lock<F, Fut, T>(label: &str, max_wait_ms: u64, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let limit = Duration::from_millis(max_wait_ms);
    let mut backoff = Backoff::new();
    let mut retries = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::debug!(
                        operation = label,
                        retries,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Locked write went through"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_database_locked() => err,
            Err(err) => return Err(err),
        };

        if started.elapsed() >= limit {
            tracing::error!(operation = label, retries, max_wait_ms, "Database still locked, giving up");
            return Err(err);
        }

        let delay = backoff.step();
        retries += 1;
        tracing::warn!(operation = label, retries, delay_ms = delay.as_millis() as u64, "Database locked, retrying");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidcache_common::Error;

    fn locked() -> Error {
        Error::Database(sqlx::Error::Protocol("database is locked".to_string()))
    }

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut backoff = Backoff::new();
        let delays: Vec<u128> = (0..9).map(|_| backoff.step().as_millis()).collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 160, 320, 640, 1000, 1000]);
    }

    #[tokio::test]
    async fn test_lock_errors_are_retried() {
        let mut calls = 0;
        let result = retry_on_lock("catalog batch", 5000, || {
            calls += 1;
            let call = calls;
            async move {
                if call < 3 {
                    Err(locked())
                } else {
                    Ok("written")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "written");
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_gives_up_with_last_lock_error() {
        let result = retry_on_lock("catalog delete", 30, || async { Err::<(), Error>(locked()) }).await;
        let err = result.unwrap_err();
        assert!(err.is_database_locked());
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let mut calls = 0;
        let result = retry_on_lock("catalog batch", 5000, || {
            calls += 1;
            async { Err::<(), Error>(Error::InvalidInput("bad row".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(calls, 1);
    }
}
