//! External broker sender.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use shorturl_core::error::BrokerError;
use shorturl_core::external::ExternalBrokerSender;

use crate::connection::{ConnectionState, ManagedConnection};

/// Publishes batches to one topic over a [`ManagedConnection`].
#[derive(Debug, Clone)]
pub struct BrokerSender {
    connection: Arc<ManagedConnection>,
    topic: String,
}

impl BrokerSender {
    /// Creates a sender publishing to `topic`.
    #[must_use]
    pub fn new(connection: Arc<ManagedConnection>, topic: impl Into<String>) -> Self {
        Self {
            connection,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl ExternalBrokerSender for BrokerSender {
    #[instrument(skip(self, payloads), fields(topic = %self.topic, count = payloads.len()))]
    async fn send_events(&self, payloads: &[Vec<u8>]) -> Result<(), BrokerError> {
        if payloads.is_empty() {
            return Ok(());
        }
        if self.connection.state() == ConnectionState::Closed {
            return Err(BrokerError::Closed);
        }

        self.connection
            .current()
            .await
            .publish(&self.topic, payloads)
            .await?;
        debug!("events sent");
        Ok(())
    }
}
