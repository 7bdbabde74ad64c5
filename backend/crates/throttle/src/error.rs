//! Throttle Error Types
//!
//! Domain-specific error variants that integrate with the unified
//! `kernel::error::AppError` system.

use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

use crate::presentation::dto::ErrorBody;

/// Throttle-specific result type alias
pub type ThrottleResult<T> = Result<T, ThrottleError>;

/// Throttle-specific error variants
///
/// These map to appropriate HTTP status codes and can be converted to
/// `AppError` for unified error handling. Nothing in this module leaks a
/// raw 500: every variant renders through the JSON envelope.
#[derive(Debug, Error)]
pub enum ThrottleError {
    /// Request quota for the window is exhausted
    #[error("Rate limit of {limit} per minute exceeded")]
    RateLimitExceeded {
        limit: u32,
        retry_after_secs: u64,
        reset_at_ms: i64,
    },

    /// Idempotency key reused with a different request payload
    #[error("Idempotency key reused for a different request")]
    IdempotencyConflict,

    /// A request bearing the same idempotency key is still executing
    #[error("Operation for this idempotency key is still in progress")]
    OperationInFlight,

    /// Request body exceeded the buffering bound
    #[error("Request body exceeds {limit_bytes} bytes")]
    PayloadTooLarge { limit_bytes: usize },

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Store call exceeded its deadline
    #[error("Store call timed out")]
    StoreTimeout,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ThrottleError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ThrottleError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ThrottleError::IdempotencyConflict | ThrottleError::OperationInFlight => {
                StatusCode::CONFLICT
            }
            ThrottleError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ThrottleError::Store(_) | ThrottleError::StoreTimeout => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ThrottleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ThrottleError::RateLimitExceeded { .. } => ErrorKind::TooManyRequests,
            ThrottleError::IdempotencyConflict | ThrottleError::OperationInFlight => {
                ErrorKind::Conflict
            }
            ThrottleError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            ThrottleError::Store(_) | ThrottleError::StoreTimeout => ErrorKind::ServiceUnavailable,
            ThrottleError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Stable slug used in the response envelope
    pub fn slug(&self) -> &'static str {
        match self {
            ThrottleError::RateLimitExceeded { .. } => "rate_limited",
            ThrottleError::IdempotencyConflict => "idempotency_conflict",
            ThrottleError::OperationInFlight => "idempotency_in_flight",
            ThrottleError::PayloadTooLarge { .. } => "payload_too_large",
            ThrottleError::Store(_) | ThrottleError::StoreTimeout => "store_unavailable",
            ThrottleError::Internal(_) => "internal_error",
        }
    }

    /// Whether this is an infrastructure fault rather than a client outcome
    pub fn is_store_failure(&self) -> bool {
        matches!(self, ThrottleError::Store(_) | ThrottleError::StoreTimeout)
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            ThrottleError::Store(e) => {
                tracing::error!(error = %e, "throttle store error");
            }
            ThrottleError::StoreTimeout => {
                tracing::error!("throttle store call timed out");
            }
            ThrottleError::Internal(msg) => {
                tracing::error!(message = %msg, "throttle internal error");
            }
            ThrottleError::RateLimitExceeded { limit, .. } => {
                tracing::warn!(limit, "rate limit exceeded");
            }
            ThrottleError::IdempotencyConflict | ThrottleError::OperationInFlight => {
                tracing::warn!(error = %self, "idempotency rejection");
            }
            ThrottleError::PayloadTooLarge { limit_bytes } => {
                tracing::warn!(limit_bytes, "request body too large");
            }
        }
    }
}

impl From<ThrottleError> for AppError {
    fn from(err: ThrottleError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        AppError::new(kind, message)
    }
}

impl IntoResponse for ThrottleError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status_code();
        let body = Json(ErrorBody::new(self.slug()));
        let mut response = (status, body).into_response();

        // 429 always advertises the quota and when it resets
        if let ThrottleError::RateLimitExceeded {
            limit,
            retry_after_secs,
            reset_at_ms,
        } = &self
        {
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(*limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            headers.insert("x-ratelimit-reset", HeaderValue::from(reset_at_ms / 1000));
            headers.insert("retry-after", HeaderValue::from(*retry_after_secs));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let denied = ThrottleError::RateLimitExceeded {
            limit: 5,
            retry_after_secs: 30,
            reset_at_ms: 60_000,
        };
        assert_eq!(denied.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ThrottleError::IdempotencyConflict.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ThrottleError::OperationInFlight.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ThrottleError::PayloadTooLarge { limit_bytes: 1024 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ThrottleError::StoreTimeout.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ThrottleError::Internal("test".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_response_headers() {
        let err = ThrottleError::RateLimitExceeded {
            limit: 5,
            retry_after_secs: 42,
            reset_at_ms: 120_000,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let headers = response.headers();
        assert_eq!(headers["x-ratelimit-limit"], "5");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["x-ratelimit-reset"], "120");
        assert_eq!(headers["retry-after"], "42");
    }

    #[test]
    fn test_conflict_slug_matches_contract() {
        assert_eq!(
            ThrottleError::IdempotencyConflict.slug(),
            "idempotency_conflict"
        );
    }

    #[test]
    fn test_app_error_conversion() {
        let app_err: AppError = ThrottleError::IdempotencyConflict.into();
        assert_eq!(app_err.kind(), ErrorKind::Conflict);
        assert_eq!(app_err.status_code(), 409);
    }
}
