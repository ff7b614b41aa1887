//! # Retry Policy
//!
//! Exponential-backoff retry for transient outbound failures. Classification
//! comes from [`ApiCallError::is_transient`]: auth and unclassified failures
//! surface after a single invocation, server/connection failures are retried
//! until the attempt budget runs out.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::resilience::error::ApiCallError;

/// Outcome of a retried operation that never produced a success.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// The failure is not worth another attempt; exactly one invocation ran.
    #[error("not retryable")]
    NotRetryable(#[source] ApiCallError),

    /// Every attempt failed with a transient error.
    #[error("exhausted after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        last: ApiCallError,
    },
}

/// Fixed attempt budget with doubling backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds, fails non-transiently, or the
    /// attempt budget is spent. Backoff starts at the base delay and doubles
    /// after each failed attempt.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiCallError>>,
    {
        let mut delay = self.base_delay;

        for attempt in 1..=self.max_attempts {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation recovered after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => {
                    return Err(RetryError::NotRetryable(err));
                }
                Err(err) if attempt == self.max_attempts => {
                    warn!(
                        attempts = self.max_attempts,
                        error = %err,
                        "Retry budget exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: self.max_attempts,
                        last: err,
                    });
                }
                Err(err) => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }

        unreachable!("retry loop covers all attempts")
    }
}
