use super::lua_scripts::INCREMENT_WITH_EXPIRY_SCRIPT;
use super::store::CounterStore;
use crate::error::{GuardError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};
use std::time::Duration;
use tracing::{debug, error, info};

/// Redis-backed distributed counter store
#[derive(Clone)]
pub struct RedisCounterStore {
    /// Redis connection manager, cheap to clone and reconnects on its own
    connection: ConnectionManager,
    /// Prefix prepended to every counter key
    key_prefix: String,
    script: Script,
}

impl RedisCounterStore {
    /// Connect to Redis. Fails when the server cannot be reached.
    pub async fn new(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| {
            GuardError::Config(format!("Invalid Redis URL '{}': {}", redis_url, e))
        })?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| GuardError::StoreUnavailable(format!("Redis connect failed: {}", e)))?;

        info!("Connected to Redis counter store");

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
            script: Script::new(INCREMENT_WITH_EXPIRY_SCRIPT),
        })
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

/// Window length as a PEXPIRE argument, which must be a positive u64
fn window_millis(ttl: Duration) -> Result<u64> {
    u64::try_from(ttl.as_millis())
        .map(|ms| ms.max(1))
        .map_err(|_| GuardError::InvalidPolicy(format!("window of {:?} is too long", ttl)))
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64> {
        let redis_key = self.redis_key(key);
        let mut connection = self.connection.clone();
        // PEXPIRE rejects 0
        let window_ms = (ttl.as_millis() as u64).max(1);

        match self
            .script
            .key(&redis_key)
            .arg(window_ms)
            .invoke_async::<_, u64>(&mut connection)
            .await
        {
            Ok(count) => {
                debug!(key = %redis_key, count, "Redis counter incremented");
                Ok(count)
            }
            Err(e) => {
                error!(key = %redis_key, error = %e, "Redis error during counter increment");
                Err(GuardError::StoreUnavailable(e.to_string()))
            }
        }
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
