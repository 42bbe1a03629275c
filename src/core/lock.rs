//! Bounded retry for SQLite lock contention.
//!
//! Several CI jobs may append to the same store file at once. SQLite already
//! serializes writers; on top of its `busy_timeout` we retry `SQLITE_BUSY` /
//! `SQLITE_LOCKED` with exponential backoff, and give up with
//! [`WardenError::StorageLockTimeout`] once the budget is spent. There is no
//! retry-forever path.

use crate::core::error::WardenError;
use std::thread;
use std::time::Duration;

/// Retry budget for one storage operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Passed to `Connection::busy_timeout` for every connection.
    pub busy_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Cap on a single backoff sleep.
    pub max_delay: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(5_000),
        }
    }
}

impl LockPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `f`, retrying on busy/locked errors until the policy is exhausted.
pub fn retry_on_busy<F, R>(policy: &LockPolicy, op: &str, mut f: F) -> Result<R, WardenError>
where
    F: FnMut() -> Result<R, WardenError>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if is_busy_error(&e) => {
                if attempt >= policy.max_retries {
                    tracing::warn!(op, attempts = attempt + 1, "storage lock budget exhausted");
                    return Err(WardenError::StorageLockTimeout {
                        op: op.to_string(),
                        attempts: attempt + 1,
                    });
                }
                attempt += 1;
                let delay = policy.delay_for(attempt);
                tracing::debug!(op, attempt, delay_ms = delay.as_millis() as u64, "store busy; backing off");
                thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Check if an error is a SQLite busy/locked error that is retryable.
pub fn is_busy_error(err: &WardenError) -> bool {
    match err {
        WardenError::RusqliteError(rusqlite::Error::SqliteFailure(code, _)) => matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}
