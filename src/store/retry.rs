//! Busy-retry policy for the store
//!
//! SQLite reports lock contention as `SQLITE_BUSY`/`SQLITE_LOCKED`; the
//! store retries those with exponential backoff before surfacing
//! [`IndexError::StoreBusy`]. One policy object is injected into the store
//! so every write path shares the same behavior.

use std::time::Duration;

use rusqlite::ErrorCode;

use crate::error::{IndexError, Result};

/// Retry policy for busy database errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Backoff multiplier per retry
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(50),
            multiplier: 2,
        }
    }
}

/// Whether an error is SQLite lock contention
pub fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == ErrorCode::DatabaseBusy || f.code == ErrorCode::DatabaseLocked
    )
}

impl RetryPolicy {
    /// Run `op`, retrying busy errors with backoff.
    ///
    /// Non-busy errors surface immediately; a busy error after the last
    /// retry becomes [`IndexError::StoreBusy`].
    pub fn run<T>(&self, mut op: impl FnMut() -> rusqlite::Result<T>) -> Result<T> {
        let mut delay = self.initial_backoff;

        for attempt in 0..=self.max_retries {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) => {
                    if attempt == self.max_retries {
                        return Err(IndexError::StoreBusy);
                    }
                    tracing::warn!(
                        "store busy (attempt {}/{}), retrying in {:?}",
                        attempt + 1,
                        self.max_retries + 1,
                        delay
                    );
                    std::thread::sleep(delay);
                    delay *= self.multiplier;
                }
                Err(e) => return Err(IndexError::Store(e)),
            }
        }
        unreachable!("loop returns on every branch")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy_error() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        )
    }

    #[test]
    fn test_is_busy() {
        assert!(is_busy(&busy_error()));
        assert!(!is_busy(&rusqlite::Error::QueryReturnedNoRows));
    }

    #[test]
    fn test_run_passes_through_success() {
        let policy = RetryPolicy::default();
        let result = policy.run(|| Ok(42)).unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn test_run_retries_busy_then_succeeds() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let mut calls = 0;
        let result = policy.run(|| {
            calls += 1;
            if calls < 3 { Err(busy_error()) } else { Ok("ok") }
        });
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_run_surfaces_store_busy_after_cap() {
        let policy = RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let mut calls = 0;
        let result: Result<()> = policy.run(|| {
            calls += 1;
            Err(busy_error())
        });
        assert!(matches!(result, Err(IndexError::StoreBusy)));
        assert_eq!(calls, 3); // first attempt + 2 retries
    }

    #[test]
    fn test_run_does_not_retry_other_errors() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let result: Result<()> = policy.run(|| {
            calls += 1;
            Err(rusqlite::Error::QueryReturnedNoRows)
        });
        assert!(matches!(result, Err(IndexError::Store(_))));
        assert_eq!(calls, 1);
    }
}
