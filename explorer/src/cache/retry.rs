//! Busy-lock retry for the shared SQLite cache file.
//!
//! Several server processes write the same file. When one of them holds the
//! write lock past the driver's busy timeout the statement fails with
//! `SQLITE_BUSY`/`SQLITE_LOCKED`; those are retried with capped exponential
//! backoff plus jitter. Every other error is returned immediately.

use rand::random;
use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::{Error, Result};

/// Backoff schedule for busy statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyRetry {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BusyRetry {
    fn default() -> Self {
        Self {
            max_retries: 8,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BusyRetry {
    /// Delay before retry number `attempt` (0-based), jitter included.
    ///
    /// Never exceeds `max_delay`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let max_ms = self.max_delay.as_millis() as u64;
        let shift = attempt.min(31) as u32;
        let backoff_ms = (self.base_delay.as_millis() as u64)
            .saturating_mul(1u64 << shift)
            .min(max_ms);
        let jitter_ms = random::<u64>() % (backoff_ms / 4 + 1);
        Duration::from_millis(backoff_ms.saturating_add(jitter_ms).min(max_ms))
    }

    /// Run `op`, retrying while it fails with a busy error.
    pub async fn run<T, F, Fut>(&self, op_name: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0usize;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if is_busy(&err) && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    attempt += 1;
                    debug!(
                        op = op_name,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Cache file busy, retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Whether `err` is SQLite reporting a held lock.
pub fn is_busy(err: &Error) -> bool {
    let Error::DatabaseSqlx(sqlx_err) = err else {
        return false;
    };

    match sqlx_err {
        sqlx::Error::Database(db_err) => {
            // SQLITE_BUSY = 5, SQLITE_LOCKED = 6
            let code = db_err.code().map(Cow::into_owned);
            matches!(code.as_deref(), Some("5") | Some("6")) || mentions_lock(db_err.message())
        }
        other => mentions_lock(&other.to_string()),
    }
}

fn mentions_lock(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("database is locked") || message.contains("database is busy")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn locked() -> Error {
        Error::DatabaseSqlx(sqlx::Error::Protocol("database is locked".to_string()))
    }

    #[test]
    fn test_busy_classification() {
        assert!(is_busy(&locked()));
        assert!(!is_busy(&Error::DatabaseSqlx(sqlx::Error::RowNotFound)));
        assert!(!is_busy(&Error::Other("database is locked".into())));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = BusyRetry::default();
        assert!(policy.delay_for(0) >= Duration::from_millis(10));
        for attempt in [5, 20, 64, usize::MAX] {
            assert!(policy.delay_for(attempt) <= policy.max_delay);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_busy_until_success() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let value = BusyRetry::default()
            .run("test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(locked())
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let policy = BusyRetry {
            max_retries: 2,
            ..BusyRetry::default()
        };
        let result: Result<()> = policy
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(locked())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<()> = BusyRetry::default()
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::DatabaseSqlx(sqlx::Error::RowNotFound))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
