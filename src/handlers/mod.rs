use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Body served by every guarded endpoint
pub async fn hello_handler() -> &'static str {
    "hello"
}

/// Liveness probe, never rate limited
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
