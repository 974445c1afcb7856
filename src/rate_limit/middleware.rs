use super::engine::RateLimiterEngine;
use super::registry::PolicyRegistry;
use super::types::{Decision, RequestContext};
use crate::error::{GuardError, Result, RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER};
use crate::metrics;
use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// What to do with a call when the counter store cannot be reached
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DegradeMode {
    /// Run the guarded work unchecked
    FailOpen,
    /// Reject the call with the store error
    #[default]
    FailClosed,
}

impl DegradeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradeMode::FailOpen => "fail_open",
            DegradeMode::FailClosed => "fail_closed",
        }
    }
}

/// Result of admitting a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The engine allowed the call
    Allowed(Decision),
    /// The store failed and the call was let through by [`DegradeMode::FailOpen`]
    Degraded,
    /// No policy guards this operation
    Unguarded,
}

/// Interception layer: runs the engine before guarded work
#[derive(Clone)]
pub struct RateLimitGuard {
    engine: Arc<RateLimiterEngine>,
    registry: Arc<PolicyRegistry>,
    degrade: DegradeMode,
}

impl RateLimitGuard {
    pub fn new(
        engine: Arc<RateLimiterEngine>,
        registry: Arc<PolicyRegistry>,
        degrade: DegradeMode,
    ) -> Self {
        Self {
            engine,
            registry,
            degrade,
        }
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Decide whether a call to `operation` may proceed.
    ///
    /// Returns [`GuardError::RateLimitExceeded`] for a denied call, and the
    /// store error when the store fails under [`DegradeMode::FailClosed`].
    pub async fn admit(&self, operation: &str, ctx: &RequestContext) -> Result<Admission> {
        let Some(policy) = self.registry.get(operation) else {
            return Ok(Admission::Unguarded);
        };

        match self.engine.check(&policy, ctx).await {
            Ok(decision) if decision.allowed => Ok(Admission::Allowed(decision)),
            Ok(decision) => Err(GuardError::RateLimitExceeded {
                identifier: policy.identifier.clone(),
                current_count: decision.current_count,
                ceiling: decision.ceiling,
            }),
            Err(e) => {
                metrics::record_degraded(self.degrade.as_str());
                match self.degrade {
                    DegradeMode::FailOpen => {
                        warn!(operation = %operation, error = %e, "Counter store unavailable, failing open");
                        Ok(Admission::Degraded)
                    }
                    DegradeMode::FailClosed => {
                        warn!(operation = %operation, error = %e, "Counter store unavailable, failing closed");
                        Err(e)
                    }
                }
            }
        }
    }

    /// Run `work` only if the call is admitted
    pub async fn guard<F, T>(&self, operation: &str, ctx: &RequestContext, work: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        self.admit(operation, ctx).await?;
        Ok(work.await)
    }
}

/// Caller identity taken from the connection, "unknown" when it is not available
pub fn client_identity(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Axum middleware enforcing the policy registered for the matched route
pub async fn rate_limit_middleware(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Response {
    let operation = match request.extensions().get::<MatchedPath>() {
        Some(path) => path.as_str().to_string(),
        None => request.uri().path().to_string(),
    };
    let ctx = RequestContext::new(operation.clone(), client_identity(&request))
        .with_extra("method", request.method().as_str());

    match guard.admit(&operation, &ctx).await {
        Ok(Admission::Allowed(decision)) => {
            let response = next.run(request).await;
            add_rate_limit_headers(response, &decision)
        }
        Ok(Admission::Degraded) | Ok(Admission::Unguarded) => next.run(request).await,
        Err(e) => {
            if e.is_rejection() {
                debug!(operation = %operation, client = %ctx.client, "Call rejected before reaching handler");
            } else {
                warn!(operation = %operation, client = %ctx.client, error = %e, "Call refused, rate limit could not be checked");
            }
            e.into_response()
        }
    }
}

/// Add rate limit headers to successful responses
pub fn add_rate_limit_headers(mut response: Response, decision: &Decision) -> Response {
    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(decision.ceiling));
    headers.insert(
        RATE_LIMIT_REMAINING_HEADER,
        HeaderValue::from(decision.remaining()),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::local::LocalCounterStore;
    use crate::rate_limit::store::CounterStore;
    use crate::rate_limit::types::{LimitScope, RateLimitPolicy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn increment_with_expiry(&self, _key: &str, _ttl: Duration) -> Result<u64> {
            Err(GuardError::StoreUnavailable("down".to_string()))
        }

        fn backend(&self) -> &'static str {
            "down"
        }
    }

    fn guard_with(store: Arc<dyn CounterStore>, degrade: DegradeMode) -> RateLimitGuard {
        let registry = PolicyRegistry::from_policies([(
            "/hello",
            RateLimitPolicy::new(10, 2, LimitScope::PerClient),
        )])
        .unwrap();
        RateLimitGuard::new(
            Arc::new(RateLimiterEngine::new(store)),
            Arc::new(registry),
            degrade,
        )
    }

    #[tokio::test]
    async fn test_denied_call_never_runs_work() {
        let guard = guard_with(Arc::new(LocalCounterStore::new()), DegradeMode::FailClosed);
        let ctx = RequestContext::new("/hello", "1.2.3.4");
        let runs = AtomicUsize::new(0);

        for _ in 0..3 {
            let _ = guard
                .guard("/hello", &ctx, async {
                    runs.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejection_carries_counts_and_identifier() {
        let guard = guard_with(Arc::new(LocalCounterStore::new()), DegradeMode::FailClosed);
        let ctx = RequestContext::new("/hello", "1.2.3.4");

        guard.admit("/hello", &ctx).await.unwrap();
        guard.admit("/hello", &ctx).await.unwrap();

        let denied = guard.admit("/hello", &ctx).await;
        assert!(denied.as_ref().is_err_and(GuardError::is_rejection));

        match denied {
            Err(GuardError::RateLimitExceeded {
                identifier,
                current_count,
                ceiling,
            }) => {
                assert_eq!(identifier, "rate_limit");
                assert_eq!(current_count, 3);
                assert_eq!(ceiling, 2);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unregistered_operation_is_unguarded() {
        let guard = guard_with(Arc::new(DownStore), DegradeMode::FailClosed);
        let ctx = RequestContext::new("/health", "1.2.3.4");

        let admission = guard.admit("/health", &ctx).await.unwrap();
        assert_eq!(admission, Admission::Unguarded);
    }

    #[tokio::test]
    async fn test_fail_open_runs_work_when_store_is_down() {
        let guard = guard_with(Arc::new(DownStore), DegradeMode::FailOpen);
        let ctx = RequestContext::new("/hello", "1.2.3.4");

        assert_eq!(
            guard.admit("/hello", &ctx).await.unwrap(),
            Admission::Degraded
        );
        let value = guard.guard("/hello", &ctx, async { 42 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_fail_closed_rejects_when_store_is_down() {
        let guard = guard_with(Arc::new(DownStore), DegradeMode::FailClosed);
        let ctx = RequestContext::new("/hello", "1.2.3.4");

        let result = guard.guard("/hello", &ctx, async { 42 }).await;
        assert!(matches!(result, Err(GuardError::StoreUnavailable(_))));
        assert!(!result.as_ref().is_err_and(GuardError::is_rejection));
    }

    #[test]
    fn test_client_identity_from_connect_info() {
        let mut request = Request::new(axum::body::Body::empty());
        assert_eq!(client_identity(&request), "unknown");

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([1, 2, 3, 4], 5555))));
        assert_eq!(client_identity(&request), "1.2.3.4");
    }

    #[test]
    fn test_add_rate_limit_headers() {
        let decision = Decision {
            allowed: true,
            current_count: 1,
            ceiling: 3,
        };
        let response = add_rate_limit_headers(Response::new(axum::body::Body::empty()), &decision);

        assert_eq!(response.headers().get(RATE_LIMIT_LIMIT_HEADER).unwrap(), "3");
        assert_eq!(
            response.headers().get(RATE_LIMIT_REMAINING_HEADER).unwrap(),
            "2"
        );
    }

    #[test]
    fn test_degrade_mode_parsing() {
        let mode: DegradeMode = serde_yaml::from_str("fail_open").unwrap();
        assert_eq!(mode, DegradeMode::FailOpen);
        assert_eq!(DegradeMode::default(), DegradeMode::FailClosed);
    }
}
