//! API error handling.
//!
//! Renders domain errors into the wire envelope `{status, message, details}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;

/// Wire-format error envelope.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// HTTP status code, mirrored in the body.
    pub status: u16,
    /// Short error summary.
    pub message: String,
    /// Human-readable detail.
    pub details: String,
}

/// API error type that renders as the envelope above.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: String,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            details: details.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            status: self.status.as_u16(),
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::NotFound { .. } => {
                ApiError::new(StatusCode::NOT_FOUND, "Job not found", err.to_string())
            }
            Error::JobNotCompleted { .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, "Job not completed", err.to_string())
            }
            Error::Validation(msg) => {
                ApiError::new(StatusCode::BAD_REQUEST, "Validation failed", msg.clone())
            }
            Error::Transport(msg) => {
                tracing::error!("Transport error: {msg}");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Transport error",
                    msg.clone(),
                )
            }
            Error::Database(e) => {
                tracing::error!("Database error: {e}");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error",
                    "A storage error occurred",
                )
            }
            _ => {
                tracing::error!("Unexpected error: {err}");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    err.to_string(),
                )
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let api_err: ApiError = Error::not_found("Job", "j1").into();
        assert_eq!(api_err.status, StatusCode::NOT_FOUND);
        assert_eq!(api_err.message, "Job not found");
        assert!(api_err.details.contains("j1"));
    }

    #[test]
    fn test_not_completed_maps_to_400() {
        let api_err: ApiError = Error::JobNotCompleted {
            id: "j1".to_string(),
            status: "PENDING".to_string(),
        }
        .into();
        assert_eq!(api_err.status, StatusCode::BAD_REQUEST);
        assert_eq!(api_err.message, "Job not completed");
        assert!(api_err.details.contains("PENDING"));
    }

    #[test]
    fn test_validation_maps_to_400() {
        let api_err: ApiError = Error::validation("urls: URL list cannot be empty").into();
        assert_eq!(api_err.status, StatusCode::BAD_REQUEST);
        assert_eq!(api_err.message, "Validation failed");
    }

    #[test]
    fn test_transport_maps_to_500() {
        let api_err: ApiError = Error::transport("publish failed").into();
        assert_eq!(api_err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api_err.message, "Transport error");
    }
}
