//! Exponential backoff for transient SCIM failures.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ScimClientError, ScimClientResult};

/// Retry policy applied by [`ScimClient`](crate::client::ScimClient) to
/// every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (0 = none).
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay_secs: u64,
    /// Upper bound for any single delay.
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_secs: 1,
            max_delay_secs: 60,
        }
    }

    #[must_use]
    pub fn new(max_retries: u32, base_delay_secs: u64) -> Self {
        Self {
            max_retries,
            base_delay_secs,
            max_delay_secs: 60,
        }
    }

    /// Whether `error` may be retried after `attempt` failed attempts.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &ScimClientError) -> bool {
        attempt < self.max_retries && (error.is_retryable() || error.is_server_error())
    }

    /// Delay before the next attempt. A `Retry-After` hint wins over the
    /// exponential schedule; both are capped at `max_delay_secs`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &ScimClientError) -> Duration {
        let secs = match error {
            ScimClientError::RateLimited {
                retry_after_secs: Some(hint),
            } => *hint,
            _ => self
                .base_delay_secs
                .saturating_mul(2u64.saturating_pow(attempt)),
        };
        Duration::from_secs(secs.min(self.max_delay_secs))
    }

    /// Run `f` until it succeeds, fails permanently, or retries run out.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut f: F) -> ScimClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ScimClientResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let error = match f().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !self.should_retry(attempt, &error) {
                let transient = error.is_retryable() || error.is_server_error();
                if attempt > 0 && transient {
                    warn!(operation, attempts = attempt + 1, error = %error, "Giving up after retries");
                    return Err(ScimClientError::MaxRetriesExceeded {
                        attempts: attempt + 1,
                        message: format!("{operation} failed after {} attempts: {error}", attempt + 1),
                    });
                }
                return Err(error);
            }

            let delay = self.delay_for(attempt, &error);
            debug!(
                operation,
                attempt = attempt + 1,
                delay_secs = delay.as_secs(),
                error = %error,
                "Retrying after transient error"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
