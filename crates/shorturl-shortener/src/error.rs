//! Shortener error types.

use shorturl_core::error::DomainError;
use thiserror::Error;

/// Errors returned by the shortener's command and query handlers.
#[derive(Debug, Error)]
pub enum ShortenerError {
    /// No short URL exists for the hash.
    #[error("short url not found: {0}")]
    ShortUrlNotFound(String),

    /// The hash exists but none of its URLs has been verified yet.
    #[error("no valid url found for: {0}")]
    ValidUrlNotFound(String),

    /// The submitted URL cannot be shortened.
    #[error("invalid long url specified: {0}")]
    InvalidLongUrl(String),

    /// Loading or saving failed.
    #[error(transparent)]
    Domain(#[from] DomainError),
}
