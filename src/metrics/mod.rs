use crate::error::{GuardError, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the global Prometheus recorder. Only one can exist per process.
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            GuardError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!(
            "guard_decisions_total",
            "Total number of rate limit decisions, labelled by outcome"
        );
        describe_counter!(
            "guard_rate_limit_exceeded_total",
            "Total number of calls rejected due to rate limiting"
        );
        describe_counter!(
            "guard_store_errors_total",
            "Total number of counter store failures"
        );
        describe_counter!(
            "guard_degraded_total",
            "Total number of calls admitted or rejected by the degrade policy"
        );
        describe_histogram!(
            "guard_store_latency_seconds",
            "Counter store round-trip latency in seconds"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.render(),
    )
}

/// Record the outcome of a rate limit check
pub fn record_decision(identifier: &str, allowed: bool) {
    let outcome = if allowed { "allowed" } else { "denied" };
    let labels = [
        ("identifier", identifier.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("guard_decisions_total", &labels).increment(1);

    if !allowed {
        record_rate_limit_exceeded(identifier);
    }
}

/// Record rate limit exceeded
pub fn record_rate_limit_exceeded(identifier: &str) {
    let labels = [("identifier", identifier.to_string())];
    counter!("guard_rate_limit_exceeded_total", &labels).increment(1);
}

/// Record a counter store failure
pub fn record_store_error(backend: &str) {
    let labels = [("backend", backend.to_string())];
    counter!("guard_store_errors_total", &labels).increment(1);
}

/// Record a counter store round-trip
pub fn record_store_latency(backend: &str, seconds: f64) {
    let labels = [("backend", backend.to_string())];
    histogram!("guard_store_latency_seconds", &labels).record(seconds);
}

/// Record a call whose fate was decided by the degrade policy
pub fn record_degraded(mode: &str) {
    let labels = [("mode", mode.to_string())];
    counter!("guard_degraded_total", &labels).increment(1);
}
