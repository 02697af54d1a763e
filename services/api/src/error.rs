//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use flyer_core::error::CoreError;
use flyer_core::ports::PortError;
use serde_json::json;
use tracing::error;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A failure reported by one of the core services.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request itself was malformed.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(core) => match core {
                CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                CoreError::Conflict(_) | CoreError::InvalidState(_) => StatusCode::CONFLICT,
                CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
                CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                CoreError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CoreError::Port(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Port(PortError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Port(PortError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Port(PortError::Unauthorized) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_distinct_statuses() {
        let cases = [
            (CoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CoreError::Conflict("x".into()), StatusCode::CONFLICT),
            (CoreError::InvalidState("x".into()), StatusCode::CONFLICT),
            (CoreError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (CoreError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (
                CoreError::ValidationFailed("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (CoreError::Port("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn server_errors_hide_details() {
        let response = ApiError::Internal("secret".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let response = ApiError::BadRequest("bad position".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
