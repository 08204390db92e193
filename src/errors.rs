use crate::rate_limit::middleware::{apply_rate_limit_headers, RateLimitRejection};
use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub enum AppError {
    // Rate limiting
    RateLimitExceeded(RateLimitRejection),
    UnknownLimiter(String),

    // Validation errors
    ValidationError(String),

    // Configuration errors
    Configuration(String),

    // Internal errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::RateLimitExceeded(rejection) => {
                write!(f, "Rate limit exceeded for limiter '{}'", rejection.limiter)
            }
            AppError::UnknownLimiter(name) => write!(f, "Unknown rate limiter: {}", name),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

// Implement IntoResponse for Axum
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::RateLimitExceeded(rejection) => return rejection_response(rejection),
            AppError::UnknownLimiter(ref name) => {
                (StatusCode::NOT_FOUND, format!("Unknown rate limiter: {}", name))
            }
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Configuration(_) => {
                tracing::error!("Configuration error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// 429 with `Retry-After` and the `X-RateLimit-*` pair
fn rejection_response(rejection: RateLimitRejection) -> Response {
    let body = Json(json!({
        "error": "Rate limit exceeded",
        "message": rejection.message,
        "retryAfter": rejection.retry_after_secs,
    }));

    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    let headers = response.headers_mut();
    headers.insert(RETRY_AFTER, HeaderValue::from(rejection.retry_after_secs));
    apply_rate_limit_headers(headers, rejection.remaining, rejection.reset_time);

    response
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_limiter_is_not_found() {
        let response = AppError::UnknownLimiter("uploads".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_rejection_sets_retry_after() {
        let rejection = RateLimitRejection {
            limiter: "auth".to_string(),
            message: "Too many authentication attempts".to_string(),
            retry_after_secs: 42,
            remaining: 0,
            reset_time: 1_700_000_042_000,
        };

        let response = AppError::RateLimitExceeded(rejection).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "42");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(
            response.headers()["x-ratelimit-reset"],
            "2023-11-14T22:14:02.000Z"
        );
    }

    #[test]
    fn test_internal_error_hides_details() {
        let err = AppError::Internal("shard poisoned".to_string());
        assert_eq!(err.to_string(), "Internal error: shard poisoned");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
