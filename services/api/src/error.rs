//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and its
//! mapping onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;
use chatbot_core::ports::PortError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable kind plus the message shown to the caller.
    /// Internal detail never leaves the process; it is logged instead.
    fn response_parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Port(port_error) => match port_error {
                PortError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "validation", msg.clone())
                }
                PortError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "auth", msg.clone()),
                PortError::NotFound(what) => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("{} not found", what),
                ),
                PortError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "timeout", msg.clone()),
                PortError::Unavailable(msg) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg.clone())
                }
                PortError::Upstream { message, .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "upstream", message.clone())
                }
                PortError::Unexpected(detail) => {
                    error!("Unexpected port error: {detail}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal",
                        "An internal server error occurred".to_string(),
                    )
                }
            },
            other => {
                error!("Internal error: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "An internal server error occurred".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.response_parts();
        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = ApiError::Port(PortError::Validation("Message cannot be empty".into()));
        let (status, kind, message) = err.response_parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(kind, "validation");
        assert_eq!(message, "Message cannot be empty");
    }

    #[test]
    fn timeout_and_unavailable_are_distinguished() {
        let timeout = ApiError::Port(PortError::Timeout("generation".into()));
        assert_eq!(timeout.response_parts().0, StatusCode::GATEWAY_TIMEOUT);

        let unavailable = ApiError::Port(PortError::Unavailable("generation".into()));
        assert_eq!(
            unavailable.response_parts().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn unexpected_detail_is_not_echoed() {
        let err = ApiError::Port(PortError::Unexpected("pool exhausted at 10.0.0.3".into()));
        let (status, _, message) = err.response_parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("10.0.0.3"));
    }
}
