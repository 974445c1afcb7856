use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Result type for guard operations
pub type Result<T> = std::result::Result<T, GuardError>;

pub const RATE_LIMIT_LIMIT_HEADER: &str = "X-RateLimit-Limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "X-RateLimit-Remaining";

/// Guard error types
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid rate limit policy: {0}")]
    InvalidPolicy(String),

    /// A guarded call went over its ceiling. This is a business signal, not a fault.
    #[error(
        "Too many requests for '{identifier}': call {current_count} exceeds the limit of {ceiling}, please try again later"
    )]
    RateLimitExceeded {
        identifier: String,
        current_count: u64,
        ceiling: u32,
    },

    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuardError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GuardError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::InvalidPolicy(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Fixed status for rejections, the body carries the detail
            GuardError::RateLimitExceeded { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GuardError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error is a rate limit rejection rather than a fault
    pub fn is_rejection(&self) -> bool {
        matches!(self, GuardError::RateLimitExceeded { .. })
    }
}

/// Translate an error into the `{status, message}` body sent to clients.
///
/// Pure: no headers, no logging, so it can be tested without a running router.
pub fn rejection_to_response(error: &GuardError) -> (StatusCode, Value) {
    let status = error.status_code();
    let body = json!({
        "status": status.as_u16(),
        "message": error.to_string(),
    });

    (status, body)
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let (status, body) = rejection_to_response(&self);

        let mut headers = HeaderMap::new();
        if let GuardError::RateLimitExceeded { ceiling, .. } = &self {
            headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(*ceiling));
            headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(0u32));
        }

        (status, headers, Json(body)).into_response()
    }
}
