//! Exponential backoff for remote reads and writes
//!
//! `max_attempts` counts every attempt including the first, so the default
//! policy (3 attempts, 1000 ms doubling) waits 1000 ms then 2000 ms before
//! giving up and returning the last error. Only [`SyncError::is_retryable`]
//! errors are retried.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::constants::retry::{INITIAL_DELAY_MS, MAX_ATTEMPTS, MAX_DELAY_MS, MULTIPLIER};
use crate::error::{Result, SyncError};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Applied to the delay after each failed retry
    pub multiplier: f32,

    /// Cap on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(INITIAL_DELAY_MS),
            multiplier: MULTIPLIER,
            max_delay: Duration::from_millis(MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay that follows the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = (self.multiplier as f64).powi(attempt.saturating_sub(1) as i32);
        let delay = Duration::from_secs_f64(self.initial_delay.as_secs_f64() * factor);
        delay.min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts.
pub async fn retry_with_backoff<F, Fut, T>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => {
                debug!(label, error = %err, "Non-retryable failure");
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                warn!(label, attempts = attempt, error = %err, "Retries exhausted");
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                debug!(
                    label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, backing off"
                );
                sleep(delay).await;
            }
        }
    }
}

/// Network failures are expected while offline; everything else is worth a warning
pub fn log_failure(label: &str, err: &SyncError) {
    if err.is_network() {
        debug!(label, error = %err, "Remote unreachable");
    } else {
        warn!(label, error = %err, "Remote call failed");
    }
}
