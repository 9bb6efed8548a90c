//! External broker receiver.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use shorturl_core::error::BrokerError;
use shorturl_core::external::ExternalBrokerReceiver;
use shorturl_core::shutdown::Shutdown;

use crate::connection::ManagedConnection;
use crate::transport::{Deliveries, Delivery};

/// Default capacity of the hand-off channel.
pub const DEFAULT_BUFFER: usize = 64;

/// Consumes one topic over a [`ManagedConnection`].
///
/// Each delivery is acknowledged right after it is handed off on the returned
/// channel. After a reconnect the subscription is re-established on the new
/// connection; deliveries that were in flight when the old one closed are
/// redelivered by the broker.
#[derive(Debug, Clone)]
pub struct BrokerReceiver {
    connection: Arc<ManagedConnection>,
    topic: String,
    buffer: usize,
}

impl BrokerReceiver {
    /// Creates a receiver for `topic`.
    #[must_use]
    pub fn new(connection: Arc<ManagedConnection>, topic: impl Into<String>) -> Self {
        Self {
            connection,
            topic: topic.into(),
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Overrides the hand-off channel capacity.
    #[must_use]
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }
}

#[async_trait]
impl ExternalBrokerReceiver for BrokerReceiver {
    #[instrument(skip(self, shutdown), fields(topic = %self.topic))]
    async fn receive_events(
        &self,
        shutdown: Shutdown,
    ) -> Result<mpsc::Receiver<Vec<u8>>, BrokerError> {
        let mut generation = self.connection.watch_generation();
        generation.borrow_and_update();
        let deliveries = self.connection.current().await.consume(&self.topic).await?;

        let (tx, rx) = mpsc::channel(self.buffer);
        let forwarder = Forwarder {
            connection: Arc::clone(&self.connection),
            topic: self.topic.clone(),
            generation,
            tx,
        };
        tokio::spawn(forwarder.run(deliveries, shutdown));
        info!("receiving events");
        Ok(rx)
    }
}

struct Forwarder {
    connection: Arc<ManagedConnection>,
    topic: String,
    generation: tokio::sync::watch::Receiver<u64>,
    tx: mpsc::Sender<Vec<u8>>,
}

impl Forwarder {
    async fn run(mut self, mut deliveries: Deliveries, shutdown: Shutdown) {
        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.wait() => break,
                next = deliveries.recv() => next,
            };

            match next {
                Some(delivery) => {
                    if !self.hand_off(delivery, &shutdown).await {
                        break;
                    }
                }
                None => match self.resubscribe(&shutdown).await {
                    Some(fresh) => deliveries = fresh,
                    None => break,
                },
            }
        }

        // Return whatever the broker already pushed to us.
        deliveries.close();
        while let Ok(delivery) = deliveries.try_recv() {
            if let Err(e) = delivery.nack(true).await {
                debug!(error = %e, "could not requeue delivery on shutdown");
            }
        }
        info!(topic = %self.topic, "receiver stopped");
    }

    /// Returns `false` once the receiver should stop.
    async fn hand_off(&self, delivery: Delivery, shutdown: &Shutdown) -> bool {
        let sent = tokio::select! {
            biased;
            () = shutdown.wait() => None,
            sent = self.tx.send(delivery.payload().to_vec()) => Some(sent.is_ok()),
        };

        match sent {
            Some(true) => {
                if let Err(e) = delivery.ack().await {
                    // The broker redelivers it.
                    warn!(topic = %self.topic, error = %e, "failed to acknowledge delivery");
                }
                true
            }
            Some(false) | None => {
                if let Err(e) = delivery.nack(true).await {
                    debug!(error = %e, "could not requeue delivery");
                }
                false
            }
        }
    }

    /// Waits for the next connection and subscribes on it.
    async fn resubscribe(&mut self, shutdown: &Shutdown) -> Option<Deliveries> {
        loop {
            tokio::select! {
                biased;
                () = shutdown.wait() => return None,
                changed = self.generation.changed() => changed.ok()?,
            }
            self.generation.borrow_and_update();

            match self.connection.current().await.consume(&self.topic).await {
                Ok(deliveries) => {
                    info!(topic = %self.topic, "re-subscribed after reconnect");
                    return Some(deliveries);
                }
                Err(e) => {
                    warn!(
                        topic = %self.topic,
                        error = %e,
                        "re-subscribe failed, waiting for next connection"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shorturl_core::shutdown;

    use super::*;
    use crate::backoff::ReconnectPolicy;
    use crate::memory::InMemoryTransport;
    use crate::transport::Connector;

    const TOPIC: &str = "url-events";

    async fn receiver(
        transport: &Arc<InMemoryTransport>,
        shutdown: Shutdown,
    ) -> (BrokerReceiver, Arc<ManagedConnection>) {
        let connection =
            ManagedConnection::connect(transport.clone(), ReconnectPolicy::default(), shutdown)
                .await
                .unwrap();
        (BrokerReceiver::new(Arc::clone(&connection), TOPIC), connection)
    }

    async fn publish(transport: &InMemoryTransport, payloads: &[&[u8]]) {
        let payloads: Vec<Vec<u8>> = payloads.iter().map(|p| p.to_vec()).collect();
        transport
            .connect()
            .await
            .unwrap()
            .publish(TOPIC, &payloads)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_received_payloads_are_handed_off_and_acked() {
        // Arrange
        let transport = Arc::new(InMemoryTransport::new());
        let (_trigger, shutdown) = shutdown::channel();
        let (receiver, _connection) = receiver(&transport, shutdown.clone()).await;
        let mut rx = receiver.receive_events(shutdown).await.unwrap();

        // Act
        publish(&transport, &[b"one", b"two"]).await;

        // Assert
        assert_eq!(rx.recv().await.unwrap(), b"one".to_vec());
        assert_eq!(rx.recv().await.unwrap(), b"two".to_vec());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.unacked(TOPIC), 0);
    }

    #[tokio::test]
    async fn test_channel_closes_on_shutdown() {
        // Arrange
        let transport = Arc::new(InMemoryTransport::new());
        let (trigger, shutdown) = shutdown::channel();
        let (receiver, _connection) = receiver(&transport, shutdown.clone()).await;
        let mut rx = receiver.receive_events(shutdown).await.unwrap();

        // Act
        trigger.trigger();

        // Assert
        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_requeues_deliveries_not_handed_off() {
        // Arrange
        let transport = Arc::new(InMemoryTransport::new());
        let (trigger, shutdown) = shutdown::channel();
        let (receiver, _connection) = receiver(&transport, shutdown.clone()).await;
        let receiver = receiver.with_buffer(1);
        let mut rx = receiver.receive_events(shutdown).await.unwrap();
        publish(&transport, &[b"1", b"2", b"3", b"4"]).await;
        assert_eq!(rx.recv().await.unwrap(), b"1".to_vec());

        // Act
        trigger.trigger();
        while rx.recv().await.is_some() {}

        // Assert
        tokio::time::sleep(Duration::from_millis(10)).await;
        let queued = transport.queued(TOPIC);
        assert!(!queued.is_empty());
        assert!(!queued.contains(&b"1".to_vec()));
        assert_eq!(transport.unacked(TOPIC), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribes_after_reconnect_and_gets_redelivery() {
        // Arrange
        let transport = Arc::new(InMemoryTransport::new());
        let (_trigger, shutdown) = shutdown::channel();
        let (receiver, connection) = receiver(&transport, shutdown.clone()).await;
        let mut generation = connection.watch_generation();
        let mut rx = receiver.receive_events(shutdown).await.unwrap();
        publish(&transport, &[b"before"]).await;
        assert_eq!(rx.recv().await.unwrap(), b"before".to_vec());

        // Act
        transport.sever_connections();
        generation.wait_for(|g| *g == 1).await.unwrap();
        publish(&transport, &[b"after"]).await;

        // Assert
        let next = tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, b"after".to_vec());
    }
}
