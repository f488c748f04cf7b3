// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with exponential backoff for storage bring-up.
//!
//! Sends are never retried in place: a failed send bumps the record's
//! `retry_count` and waits for the next sync trigger. Backoff only applies to
//! opening the local database, where a locked or briefly unavailable file
//! should not lose the session.
//!
//! # Example
//!
//! ```
//! use outbox_engine::RetryConfig;
//!
//! let open = RetryConfig::storage_open();
//! assert_eq!(open.max_attempts, Some(5));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Backoff settings for a retried operation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// `None` retries forever
    pub max_attempts: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::storage_open()
    }
}

impl RetryConfig {
    /// Opening the queue database: 5 attempts over roughly five seconds, so a
    /// bad path fails fast instead of hanging the producer.
    #[must_use]
    pub fn storage_open() -> Self {
        Self {
            max_attempts: Some(5),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Schema statements: a couple of quick attempts to ride out `SQLITE_BUSY`.
    #[must_use]
    pub fn schema() -> Self {
        Self {
            max_attempts: Some(3),
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
            factor: 2.0,
        }
    }

    /// Delay to wait after the given number of failed attempts (1-based).
    #[must_use]
    pub fn delay_after(&self, failures: usize) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 1..failures {
            delay = delay.mul_f64(self.factor).min(self.max_delay);
        }
        delay.min(self.max_delay)
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }
}

/// Run `operation` until it succeeds or the attempt budget is spent.
/// The last error is returned on exhaustion.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut failures = 0usize;

    loop {
        match operation().await {
            Ok(val) => {
                if failures > 0 {
                    info!(operation = operation_name, failures, "Operation recovered after retries");
                }
                return Ok(val);
            }
            Err(err) => {
                failures += 1;

                if let Some(max) = config.max_attempts {
                    if failures >= max {
                        warn!(operation = operation_name, attempts = failures, error = %err, "Giving up");
                        return Err(err);
                    }
                }

                let delay = config.delay_after(failures);
                warn!(
                    operation = operation_name,
                    attempt = failures,
                    max_attempts = ?config.max_attempts,
                    error = %err,
                    retry_in = ?delay,
                    "Operation failed, backing off"
                );
                sleep(delay).await;
            }
        }
    }
}
