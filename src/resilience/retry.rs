//! Retry executor.

use super::time::TimeOperations;
use super::RetryPolicy;
use crate::errors::{OktaError, OktaErrorKind, OktaResult};
use crate::observability::TracingHooks;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Runs an operation under a [`RetryPolicy`].
pub struct RetryExecutor {
    policy: RetryPolicy,
    time: Arc<dyn TimeOperations>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish()
    }
}

impl RetryExecutor {
    /// Creates a new retry executor.
    pub fn new(policy: RetryPolicy, time: Arc<dyn TimeOperations>) -> Self {
        Self { policy, time }
    }

    /// The policy in force.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Executes `operation`, retrying retryable failures.
    ///
    /// With backoff disabled, or a retry count of 0, the first error is
    /// returned as is. Once the retry budget is spent the last error comes
    /// back wrapped in a `RetryExhausted` error.
    pub async fn execute<F, Fut, T>(
        &self,
        method: &str,
        url: &str,
        mut operation: F,
    ) -> OktaResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = OktaResult<T>>,
    {
        let mut retries = 0u32;
        let mut prior = Duration::ZERO;

        loop {
            TracingHooks::on_request_start(method, url, retries);
            let error = match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

            if !error.is_retryable() || !self.policy.enabled || self.policy.max_retries == 0 {
                return Err(error);
            }
            if !self.policy.allows_retry(retries) {
                return Err(OktaError::retry_exhausted(retries + 1, error));
            }

            let delay = match (error.kind(), error.reset_in()) {
                (OktaErrorKind::RateLimited, Some(reset_in)) => {
                    self.policy.rate_limited_wait(Duration::from_secs(reset_in))
                }
                _ => self.policy.next_wait(retries, prior),
            };

            TracingHooks::on_retry(method, url, retries + 1, delay);
            tracing::debug!(error = %error, "Retrying after error");

            self.time.sleep(delay).await;
            prior = delay;
            retries += 1;
        }
    }
}
