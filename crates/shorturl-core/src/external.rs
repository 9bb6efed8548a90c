//! Contracts for the external message broker.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BrokerError;
use crate::shutdown::Shutdown;

/// Publishes encoded events to the external broker.
#[async_trait]
pub trait ExternalBrokerSender: Send + Sync {
    /// Sends every payload or none of them.
    async fn send_events(&self, payloads: &[Vec<u8>]) -> Result<(), BrokerError>;
}

/// Consumes encoded events from the external broker.
#[async_trait]
pub trait ExternalBrokerReceiver: Send + Sync {
    /// Starts consuming. The returned channel is closed once `shutdown`
    /// fires; messages are acknowledged only after being handed off on it.
    async fn receive_events(&self, shutdown: Shutdown)
    -> Result<mpsc::Receiver<Vec<u8>>, BrokerError>;
}
