//! Clock and sleep abstraction.
//!
//! Every wait in the retry executor and the capacity governor goes through
//! [`TimeOperations`], so tests (and replayed cassettes) never sleep for real.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// Source of wall-clock time and sleeping.
#[async_trait]
pub trait TimeOperations: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProductionTime;

#[async_trait]
impl TimeOperations for ProductionTime {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: sleeping returns at once, advances the clock and records
/// the requested duration.
#[derive(Debug)]
pub struct TestTime {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for TestTime {
    fn default() -> Self {
        Self::starting_at(Utc::now())
    }
}

impl TestTime {
    /// Creates a clock frozen at `start`.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Sum of all recorded sleeps.
    pub fn total_slept(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }

    /// Moves the clock forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
    }
}

#[async_trait]
impl TimeOperations for TestTime {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_time_records_and_advances() {
        let start = Utc::now();
        let time = TestTime::starting_at(start);

        time.sleep(Duration::from_secs(30)).await;
        time.sleep(Duration::from_secs(60)).await;

        assert_eq!(time.sleeps(), vec![Duration::from_secs(30), Duration::from_secs(60)]);
        assert_eq!(time.total_slept(), Duration::from_secs(90));
        assert_eq!((time.now() - start).num_seconds(), 90);
    }
}
