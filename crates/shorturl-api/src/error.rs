//! Shorturl API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use shorturl_core::error::{BrokerError, DomainError};
use shorturl_shortener::error::ShortenerError;
use shorturl_validator::error::ValidationError;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// An environment variable is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying the schema failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The external broker could not be reached.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// A validator could not be set up.
    #[error("validator error: {0}")]
    Validator(#[from] ValidationError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `ShortenerError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub ShortenerError);

impl From<ShortenerError> for ApiError {
    fn from(err: ShortenerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            ShortenerError::ShortUrlNotFound(_) => (StatusCode::NOT_FOUND, "short_url_not_found"),
            ShortenerError::ValidUrlNotFound(_) => (StatusCode::NOT_FOUND, "valid_url_not_found"),
            ShortenerError::InvalidLongUrl(_) => (StatusCode::BAD_REQUEST, "invalid_long_url"),
            ShortenerError::Domain(DomainError::EntityNotFound(_)) => {
                (StatusCode::NOT_FOUND, "entity_not_found")
            }
            ShortenerError::Domain(DomainError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            ShortenerError::Domain(
                DomainError::Infrastructure(_) | DomainError::UnhandledEvent { .. },
            ) => (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
