use super::clock::{Clock, SystemClock};
use super::store::CounterStore;
use crate::error::{GuardError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A counter and the instant its window closes
#[derive(Debug, Clone, Copy)]
struct CounterRecord {
    count: u64,
    expires_at: Instant,
}

/// In-process counter store backed by a concurrent map.
///
/// The map's per-shard write lock is held for the whole
/// increment-or-create step, which makes it atomic per key.
pub struct LocalCounterStore {
    records: DashMap<String, CounterRecord>,
    clock: Arc<dyn Clock>,
}

impl LocalCounterStore {
    /// Create a store driven by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store driven by a custom clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// Drop every record whose window has closed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at > now);
        let removed = before.saturating_sub(self.records.len());

        if removed > 0 {
            debug!(removed, "Purged expired rate limit counters");
        }
        removed
    }

    /// Periodically purge expired records in the background
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.purge_expired();
            }
        })
    }

    /// Number of live or not-yet-purged counters (for testing/monitoring)
    pub fn active_counters(&self) -> usize {
        self.records.len()
    }
}

impl Default for LocalCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for LocalCounterStore {
    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64> {
        let now = self.clock.now();
        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            GuardError::InvalidPolicy(format!("window of {:?} is too long for key '{}'", ttl, key))
        })?;

        let mut record = self
            .records
            .entry(key.to_string())
            .or_insert(CounterRecord {
                count: 0,
                expires_at,
            });

        if record.expires_at <= now {
            trace!(key = %key, "Counter window elapsed, starting a new one");
            *record = CounterRecord {
                count: 0,
                expires_at,
            };
        }

        record.count += 1;
        Ok(record.count)
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}
