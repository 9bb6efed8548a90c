//! Sequential composition of validators.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ValidationError;
use crate::validator::UrlValidator;

/// Runs validators in order, stopping at the first one that rejects or
/// errors.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn UrlValidator>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|stage| stage.name()))
            .finish()
    }
}

impl Pipeline {
    /// Creates an empty pipeline, which accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn with(mut self, stage: Arc<dyn UrlValidator>) -> Self {
        self.stages.push(stage);
        self
    }
}

#[async_trait]
impl UrlValidator for Pipeline {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    async fn validate_url(&self, url: &str) -> Result<bool, ValidationError> {
        self.validate_urls(&[url.to_owned()]).await
    }

    async fn validate_urls(&self, urls: &[String]) -> Result<bool, ValidationError> {
        for stage in &self.stages {
            if !stage.validate_urls(urls).await? {
                debug!(stage = stage.name(), "urls rejected");
                return Ok(false);
            }
        }
        Ok(true)
    }
}
