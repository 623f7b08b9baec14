//! Retry and timeout policies for external calls

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::DomainError;

/// Retry policy applied to an operation, independent of what it wraps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
        }
    }

    /// Policy for idempotent schema initialization during a full sync.
    pub fn schema_init() -> Self {
        Self::new(3, Duration::from_secs(2), 1.5)
    }

    /// Policy wrapping a whole incremental sync attempt.
    pub fn incremental_sync() -> Self {
        Self::new(2, Duration::from_secs(5), 1.5)
    }

    /// Delay before attempt `attempt` (1-indexed; attempt 1 has no delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let factor = self.multiplier.powi(attempt as i32 - 2);
        self.base_delay.mul_f64(factor)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, DomainError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt + 1);

                    warn!(
                        operation = %operation,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = %delay.as_millis(),
                        error = %err,
                        "Retrying after failure"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Bounds a blocking I/O call with a deadline, mapping the elapsed case onto
/// the timeout error class.
pub async fn with_timeout<T, Fut>(
    operation: &str,
    limit: Duration,
    fut: Fut,
) -> Result<T, DomainError>
where
    Fut: Future<Output = Result<T, DomainError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DomainError::timeout(operation)),
    }
}
