//! Reachability check over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use tracing::debug;

use crate::error::ValidationError;
use crate::validator::UrlValidator;

/// Default time allowed for one check.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts URLs that answer a `HEAD` request with a success or redirect
/// status.
#[derive(Debug, Clone)]
pub struct ReachabilityValidator {
    client: reqwest::Client,
}

impl ReachabilityValidator {
    /// Creates a validator whose requests give up after `timeout`. Redirects
    /// are not followed.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(timeout: Duration) -> Result<Self, ValidationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|e| ValidationError::Configuration(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UrlValidator for ReachabilityValidator {
    fn name(&self) -> &'static str {
        "reachability"
    }

    async fn validate_url(&self, url: &str) -> Result<bool, ValidationError> {
        match self.client.head(url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(url, %status, "reachability checked");
                Ok(status.is_success() || status.is_redirection())
            }
            Err(e) if e.is_connect() || e.is_timeout() => {
                debug!(url, error = %e, "url unreachable");
                Ok(false)
            }
            Err(e) => Err(ValidationError::Check {
                url: url.to_owned(),
                reason: e.to_string(),
            }),
        }
    }
}
