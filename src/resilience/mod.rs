//! Retry policy, backoff and rate-limit capacity management.

mod governor;
mod retry;
mod time;

pub use governor::{
    reset_from_headers, Bucket, CapacityGovernor, RateLimitInfo, HEADER_LIMIT, HEADER_REMAINING,
    HEADER_RESET,
};
pub use retry::RetryExecutor;
pub use time::{ProductionTime, TestTime, TimeOperations};

use std::time::Duration;

/// Upper bound on the retry count.
pub const MAX_RETRY_LIMIT: u32 = 100;

/// Retry and backoff parameters derived from provider configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Backoff on retryable failures; off means the first failure is returned.
    pub enabled: bool,
    /// First wait and lower bound.
    pub min_wait: Duration,
    /// Upper bound on any single wait.
    pub max_wait: Duration,
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Percentage of each rate-limit window the client may use.
    pub max_api_capacity: u8,
    /// Per-request deadline, `None` for no deadline.
    pub request_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_wait: Duration::from_secs(30),
            max_wait: Duration::from_secs(300),
            max_retries: 5,
            max_api_capacity: 100,
            request_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Next wait for zero-based `attempt`, given the previous wait.
    ///
    /// Grows as `min_wait * 2^attempt`, never drops below `prior` and never
    /// exceeds `max_wait`.
    pub fn next_wait(&self, attempt: u32, prior: Duration) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let grown = self
            .min_wait
            .checked_mul(factor)
            .unwrap_or(self.max_wait);
        grown.max(prior).min(self.max_wait)
    }

    /// Wait after a 429 whose window resets in `reset_in`.
    pub fn rate_limited_wait(&self, reset_in: Duration) -> Duration {
        reset_in.min(self.max_wait)
    }

    /// Returns true if another retry is allowed after `retries` retries.
    pub fn allows_retry(&self, retries: u32) -> bool {
        self.enabled && retries < self.max_retries.min(MAX_RETRY_LIMIT)
    }
}
