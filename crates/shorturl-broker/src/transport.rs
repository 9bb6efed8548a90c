//! Transport abstraction the broker clients are written against.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use shorturl_core::error::BrokerError;

/// Opens connections to the broker.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a fresh connection.
    async fn connect(&self) -> Result<Arc<dyn Connection>, BrokerError>;
}

/// Stream of deliveries for one topic subscription. Closed when the
/// connection it belongs to closes.
pub type Deliveries = mpsc::UnboundedReceiver<Delivery>;

/// A live broker connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Publishes every payload to `topic` in one transaction: either all of
    /// them are enqueued or none is.
    async fn publish(&self, topic: &str, payloads: &[Vec<u8>]) -> Result<(), BrokerError>;

    /// Subscribes to `topic`.
    async fn consume(&self, topic: &str) -> Result<Deliveries, BrokerError>;

    /// Completes once the connection is closed.
    async fn closed(&self);
}

/// Settles deliveries on the connection that produced them.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Confirms processing of `tag`.
    async fn ack(&self, tag: u64) -> Result<(), BrokerError>;

    /// Rejects `tag`, putting it back on the queue when `requeue` is set.
    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), BrokerError>;
}

/// One message handed out by a subscription.
pub struct Delivery {
    payload: Vec<u8>,
    tag: u64,
    acknowledger: Arc<dyn Acknowledger>,
}

impl Delivery {
    /// Creates a delivery settled through `acknowledger`.
    #[must_use]
    pub fn new(payload: Vec<u8>, tag: u64, acknowledger: Arc<dyn Acknowledger>) -> Self {
        Self {
            payload,
            tag,
            acknowledger,
        }
    }

    /// Message body.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Delivery tag, unique per transport.
    #[must_use]
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Acknowledges the delivery.
    ///
    /// # Errors
    ///
    /// Fails if the connection that produced the delivery is gone.
    pub async fn ack(self) -> Result<(), BrokerError> {
        self.acknowledger.ack(self.tag).await
    }

    /// Negatively acknowledges the delivery.
    ///
    /// # Errors
    ///
    /// Fails if the connection that produced the delivery is gone.
    pub async fn nack(self, requeue: bool) -> Result<(), BrokerError> {
        self.acknowledger.nack(self.tag, requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("tag", &self.tag)
            .field("len", &self.payload.len())
            .finish_non_exhaustive()
    }
}
