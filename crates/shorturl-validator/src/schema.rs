//! Syntactic URL check.

use async_trait::async_trait;
use url::Url;

use crate::error::ValidationError;
use crate::validator::UrlValidator;

/// Accepts absolute `http` and `https` URLs that name a host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

#[async_trait]
impl UrlValidator for SchemaValidator {
    fn name(&self) -> &'static str {
        "schema"
    }

    async fn validate_url(&self, url: &str) -> Result<bool, ValidationError> {
        let Ok(parsed) = Url::parse(url) else {
            return Ok(false);
        };
        Ok(matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accepts_http_and_https() {
        let validator = SchemaValidator;

        assert!(validator.validate_url("https://google.com").await.unwrap());
        assert!(validator.validate_url("http://example.com/a?b=c").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_other_schemes_and_garbage() {
        let validator = SchemaValidator;

        for url in ["ftp://example.com", "mailto:a@example.com", "example.com", ""] {
            assert!(!validator.validate_url(url).await.unwrap(), "{url:?}");
        }
    }
}
