use super::key::LimitKey;
use super::store::CounterStore;
use super::types::{Decision, RateLimitPolicy, RequestContext};
use super::window;
use crate::error::{GuardError, Result};
use crate::metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default bound on a single counter store round-trip
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// Fixed-window rate limiter.
///
/// Stateless between calls: every counter lives in the [`CounterStore`], and
/// each check costs exactly one atomic store round-trip.
pub struct RateLimiterEngine {
    store: Arc<dyn CounterStore>,
    store_timeout: Duration,
}

impl RateLimiterEngine {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        info!(backend = store.backend(), "Initializing rate limiter engine");
        Self {
            store,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound every store round-trip by `timeout`
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Charge one call against the policy's counter and decide whether it may run.
    ///
    /// A call over the ceiling is a normal `Decision { allowed: false, .. }`.
    /// The only error is [`GuardError::StoreUnavailable`]; the engine never
    /// turns a store fault into an allow or deny.
    pub async fn check(
        &self,
        policy: &RateLimitPolicy,
        ctx: &RequestContext,
    ) -> Result<Decision> {
        let key = LimitKey::build(policy, ctx);
        let backend = self.store.backend();

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.store_timeout,
            self.store.increment_with_expiry(key.as_str(), policy.window()),
        )
        .await;
        metrics::record_store_latency(backend, started.elapsed().as_secs_f64());

        let count = match outcome {
            Ok(Ok(count)) => count,
            Ok(Err(e)) => {
                error!(key = %key, backend, error = %e, "Counter store failed");
                metrics::record_store_error(backend);
                return Err(into_store_unavailable(e));
            }
            Err(_) => {
                error!(
                    key = %key,
                    backend,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Counter store timed out"
                );
                metrics::record_store_error(backend);
                return Err(GuardError::StoreUnavailable(format!(
                    "{} store did not answer within {:?}",
                    backend, self.store_timeout
                )));
            }
        };

        let decision = Decision {
            allowed: window::evaluate(count, policy.ceiling),
            current_count: count,
            ceiling: policy.ceiling,
        };
        metrics::record_decision(&policy.identifier, decision.allowed);

        if decision.allowed {
            debug!(
                key = %key,
                count,
                ceiling = policy.ceiling,
                "Rate limit check passed"
            );
        } else {
            warn!(
                key = %key,
                count,
                ceiling = policy.ceiling,
                client = %ctx.client,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }
}

fn into_store_unavailable(error: GuardError) -> GuardError {
    match error {
        GuardError::StoreUnavailable(_) => error,
        other => GuardError::StoreUnavailable(other.to_string()),
    }
}
