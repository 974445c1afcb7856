use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Shared counter storage used by the rate limiter engine.
///
/// Implementations own every counter record, including its expiry. The
/// engine keeps no state of its own, so all concurrency safety lives here.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter at `key` and return the new count.
    ///
    /// An absent or expired record is created at 1 with an expiry of
    /// `now + ttl`. An existing record is incremented without touching its
    /// expiry. Connectivity and operational failures are reported as
    /// [`GuardError::StoreUnavailable`](crate::error::GuardError::StoreUnavailable).
    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// Short backend name used in logs and metric labels
    fn backend(&self) -> &'static str;
}
