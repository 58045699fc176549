/// Unified error types for the Learnhub progression service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum LmsError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Caller lacks the capability, or the module is still locked
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate module order)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Failures talking to GitHub or the AI provider
    #[error("Integration error: {0}")]
    Integration(String),

    /// Stored content that no longer parses
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for LmsError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            LmsError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden", self.to_string()),
            LmsError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            LmsError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            LmsError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            LmsError::Integration(_) => (
                StatusCode::BAD_GATEWAY,
                "UpstreamFailure",
                "Upstream service failed".to_string(),
            ),
            LmsError::Database(_)
            | LmsError::Migration(_)
            | LmsError::Serialization(_)
            | LmsError::Internal(_)
            | LmsError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type LmsResult<T> = Result<T, LmsError>;
