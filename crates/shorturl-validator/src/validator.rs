//! The validator capability.

use async_trait::async_trait;

use crate::error::ValidationError;

/// Decides whether URLs may be redirected to.
#[async_trait]
pub trait UrlValidator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Checks a single URL.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the check itself could not run.
    async fn validate_url(&self, url: &str) -> Result<bool, ValidationError>;

    /// Checks every URL; `true` only if all of them pass. Stops at the first
    /// URL that fails or errors.
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` encountered.
    async fn validate_urls(&self, urls: &[String]) -> Result<bool, ValidationError> {
        for url in urls {
            if !self.validate_url(url).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
