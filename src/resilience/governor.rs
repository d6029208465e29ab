//! Proactive rate-limit guard.
//!
//! Okta reports its one-minute quota on every response through
//! `X-Rate-Limit-Limit`, `X-Rate-Limit-Remaining` and `X-Rate-Limit-Reset`.
//! The governor remembers the last values per endpoint bucket and holds
//! requests back until the window resets once the configured share of the
//! quota has been used.

use super::time::TimeOperations;
use crate::observability::TracingHooks;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Quota header names.
pub const HEADER_LIMIT: &str = "x-rate-limit-limit";
/// Remaining calls in the window.
pub const HEADER_REMAINING: &str = "x-rate-limit-remaining";
/// Window reset, epoch seconds.
pub const HEADER_RESET: &str = "x-rate-limit-reset";

/// Endpoint groups with independent quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// `/api/v1/apps`
    Apps,
    /// `/api/v1/users`
    Users,
    /// Everything else.
    Other,
}

impl Bucket {
    /// Classifies a request path (or full URL).
    pub fn classify(path: &str) -> Self {
        let path = match url::Url::parse(path) {
            Ok(url) => url.path().to_string(),
            Err(_) => path.to_string(),
        };
        if path.starts_with("/api/v1/apps") {
            Bucket::Apps
        } else if path.starts_with("/api/v1/users") {
            Bucket::Users
        } else {
            Bucket::Other
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Apps => write!(f, "apps"),
            Bucket::Users => write!(f, "users"),
            Bucket::Other => write!(f, "other"),
        }
    }
}

/// Snapshot of the quota headers from one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Calls allowed in the window.
    pub limit: u64,
    /// Calls left in the window.
    pub remaining: u64,
    /// When the window resets.
    pub reset_at: DateTime<Utc>,
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

impl RateLimitInfo {
    /// Parses the quota headers; `None` if any is missing or malformed.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let limit = header_u64(headers, HEADER_LIMIT)?;
        let remaining = header_u64(headers, HEADER_REMAINING)?;
        let reset_at = reset_from_headers(headers)?;
        Some(Self {
            limit,
            remaining,
            reset_at,
        })
    }

    /// Percentage of the window already consumed.
    pub fn used_percent(&self) -> u64 {
        if self.limit == 0 {
            return 100;
        }
        self.limit.saturating_sub(self.remaining) * 100 / self.limit
    }
}

/// Reads `X-Rate-Limit-Reset` as a timestamp.
pub fn reset_from_headers(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let epoch = header_u64(headers, HEADER_RESET)?;
    DateTime::from_timestamp(epoch as i64, 0)
}

/// Defers requests once a bucket has used its share of the quota.
pub struct CapacityGovernor {
    max_capacity: u8,
    buckets: Mutex<HashMap<Bucket, RateLimitInfo>>,
    time: Arc<dyn TimeOperations>,
}

impl fmt::Debug for CapacityGovernor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapacityGovernor")
            .field("max_capacity", &self.max_capacity)
            .field("buckets", &*self.buckets.lock())
            .finish()
    }
}

impl CapacityGovernor {
    /// Creates a governor allowing `max_capacity` percent of each window.
    pub fn new(max_capacity: u8, time: Arc<dyn TimeOperations>) -> Self {
        Self {
            max_capacity: max_capacity.clamp(1, 100),
            buckets: Mutex::new(HashMap::new()),
            time,
        }
    }

    /// Returns true if deferral is active at all.
    pub fn is_enabled(&self) -> bool {
        self.max_capacity < 100
    }

    /// Records the quota headers of a response to `path`.
    pub fn observe(&self, path: &str, headers: &HeaderMap) {
        if let Some(info) = RateLimitInfo::from_headers(headers) {
            self.buckets.lock().insert(Bucket::classify(path), info);
        }
    }

    /// Last quota snapshot for a bucket.
    pub fn snapshot(&self, bucket: Bucket) -> Option<RateLimitInfo> {
        self.buckets.lock().get(&bucket).cloned()
    }

    /// How long a request to `path` must wait, if at all.
    pub fn delay_for(&self, path: &str) -> Option<Duration> {
        if !self.is_enabled() {
            return None;
        }
        let info = self.snapshot(Bucket::classify(path))?;
        if info.used_percent() < u64::from(self.max_capacity) {
            return None;
        }
        (info.reset_at - self.time.now()).to_std().ok()
    }

    /// Waits for the window to reset if the bucket for `path` is over its
    /// share.
    pub async fn acquire(&self, path: &str) {
        let bucket = Bucket::classify(path);
        if let Some(delay) = self.delay_for(path) {
            let used = self
                .snapshot(bucket)
                .map(|info| info.used_percent())
                .unwrap_or_default();
            TracingHooks::on_capacity_deferral(&bucket.to_string(), used, delay);
            self.time.sleep(delay).await;
            // The window has rolled over; the old numbers no longer apply.
            self.buckets.lock().remove(&bucket);
        }
    }
}
