pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod observability;
pub mod rate_limit;

use crate::config::{GuardConfig, StoreBackend, StoreConfig};
use crate::error::{GuardError, Result};
use crate::metrics::{metrics_handler, MetricsService};
use crate::observability::request_id_middleware;
use crate::rate_limit::{
    rate_limit_middleware, CounterStore, LocalCounterStore, PolicyRegistry, RateLimitGuard,
    RateLimiterEngine, RedisCounterStore,
};
use axum::{
    middleware,
    routing::{any, get, on, MethodFilter},
    Router as AxumRouter,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Build the counter store selected by the configuration
pub async fn build_store(config: &StoreConfig) -> Result<Arc<dyn CounterStore>> {
    match config.backend {
        StoreBackend::Local => {
            let store = Arc::new(LocalCounterStore::new());
            store
                .clone()
                .spawn_sweeper(Duration::from_secs(config.sweep_interval_secs));
            info!("Using local counter store");
            Ok(store)
        }
        StoreBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                GuardError::Config("store.redis_url is required for the redis backend".to_string())
            })?;
            // Redis must be reachable at startup; later outages follow the degrade mode
            let store = RedisCounterStore::new(url, config.key_prefix.clone()).await?;
            info!("Using redis counter store");
            Ok(Arc::new(store))
        }
    }
}

/// Build the rate limit guard for the configured endpoints
pub fn build_guard(config: &GuardConfig, store: Arc<dyn CounterStore>) -> Result<RateLimitGuard> {
    let registry = PolicyRegistry::from_policies(
        config
            .endpoints
            .iter()
            .map(|endpoint| (endpoint.path.clone(), endpoint.rate_limit.clone())),
    )?;
    info!("Registered {} rate limit policies", registry.len());

    let engine = RateLimiterEngine::new(store)
        .with_store_timeout(Duration::from_millis(config.store.timeout_ms));

    Ok(RateLimitGuard::new(
        Arc::new(engine),
        Arc::new(registry),
        config.degrade,
    ))
}

/// Build the axum application: guarded endpoints, `/health` and optionally `/metrics`
pub fn build_app(
    config: &GuardConfig,
    store: Arc<dyn CounterStore>,
    metrics: Option<MetricsService>,
) -> Result<AxumRouter> {
    config.validate()?;
    let guard = build_guard(config, store)?;

    let mut guarded = AxumRouter::new();
    for endpoint in &config.endpoints {
        let methods = endpoint.parsed_methods()?;
        let route = if methods.is_empty() {
            any(handlers::hello_handler)
        } else {
            let mut filter: Option<MethodFilter> = None;
            for method in methods {
                let next = MethodFilter::try_from(method.clone()).map_err(|_| {
                    GuardError::Config(format!("Unsupported HTTP method '{}'", method))
                })?;
                filter = Some(match filter {
                    Some(existing) => existing.or(next),
                    None => next,
                });
            }
            match filter {
                Some(filter) => on(filter, handlers::hello_handler),
                None => any(handlers::hello_handler),
            }
        };
        guarded = guarded.route(&endpoint.path, route);
    }

    // route_layer panics on a router without routes
    if !config.endpoints.is_empty() {
        guarded = guarded.route_layer(middleware::from_fn_with_state(
            guard,
            rate_limit_middleware,
        ));
    }

    let mut app = AxumRouter::new()
        .route("/health", get(handlers::health_handler))
        .merge(guarded);

    if let Some(metrics) = metrics {
        app = app.route("/metrics", get(metrics_handler).with_state(metrics));
    }

    Ok(app
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.timeout_secs,
        )))
        .layer(TraceLayer::new_for_http()))
}

/// Initialize and run the service
pub async fn init_service(config: GuardConfig) -> Result<()> {
    config.validate()?;

    info!("Starting endpoint guard");

    let store = build_store(&config.store).await?;
    let metrics = MetricsService::new()?;
    let app = build_app(&config, store, Some(metrics))?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(GuardError::Io)?;

    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| GuardError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "endpoint_guard=debug,tower_http=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
