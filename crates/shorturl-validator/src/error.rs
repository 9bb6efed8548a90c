//! Validation error types.

use thiserror::Error;

/// Errors raised while validating, as opposed to a URL failing validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The validator could not be set up.
    #[error("validator misconfigured: {0}")]
    Configuration(String),

    /// A check could not be carried out for `url`.
    #[error("check failed for {url}: {reason}")]
    Check {
        /// The URL being checked.
        url: String,
        /// What went wrong.
        reason: String,
    },
}
