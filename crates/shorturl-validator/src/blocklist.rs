//! Safety check against a host deny-list.

use std::collections::HashSet;

use async_trait::async_trait;
use url::Url;

use crate::error::ValidationError;
use crate::validator::UrlValidator;

/// Rejects URLs whose host, or any parent domain of it, is blocked.
#[derive(Debug, Clone, Default)]
pub struct BlocklistValidator {
    blocked: HashSet<String>,
}

impl BlocklistValidator {
    /// Creates a validator blocking `hosts`. Matching is case-insensitive.
    #[must_use]
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blocked: hosts
                .into_iter()
                .map(|host| host.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }

    fn is_blocked(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let mut candidate = host.as_str();
        loop {
            if self.blocked.contains(candidate) {
                return true;
            }
            match candidate.split_once('.') {
                Some((_, parent)) => candidate = parent,
                None => return false,
            }
        }
    }
}

#[async_trait]
impl UrlValidator for BlocklistValidator {
    fn name(&self) -> &'static str {
        "blocklist"
    }

    async fn validate_url(&self, url: &str) -> Result<bool, ValidationError> {
        let parsed = Url::parse(url).map_err(|e| ValidationError::Check {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(parsed.host_str().is_some_and(|host| !self.is_blocked(host)))
    }
}
