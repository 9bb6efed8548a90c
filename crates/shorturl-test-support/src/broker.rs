//! Test broker doubles: senders, receivers and subscribers.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use shorturl_core::broker::Subscriber;
use shorturl_core::error::{BrokerError, DomainError};
use shorturl_core::event::DomainEvent;
use shorturl_core::external::{ExternalBrokerReceiver, ExternalBrokerSender};
use shorturl_core::shutdown::Shutdown;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct SenderState {
    sent: Vec<Vec<u8>>,
    failing_payloads: Vec<Vec<u8>>,
    failing: bool,
}

/// An external sender that records every payload it accepts. It can be told
/// to reject specific payloads, or everything, to exercise retry paths.
#[derive(Debug, Default)]
pub struct RecordingSender {
    state: Mutex<SenderState>,
}

impl RecordingSender {
    /// Create a sender that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any batch containing `payload` until [`RecordingSender::heal`].
    pub fn fail_payload(&self, payload: &[u8]) {
        self.lock().failing_payloads.push(payload.to_vec());
    }

    /// Reject every batch until [`RecordingSender::heal`].
    pub fn fail_all(&self) {
        self.lock().failing = true;
    }

    /// Accept everything again.
    pub fn heal(&self) {
        let mut state = self.lock();
        state.failing = false;
        state.failing_payloads.clear();
    }

    /// Returns every accepted payload in send order.
    #[must_use]
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SenderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ExternalBrokerSender for RecordingSender {
    async fn send_events(&self, payloads: &[Vec<u8>]) -> Result<(), BrokerError> {
        let mut state = self.lock();
        if state.failing
            || payloads
                .iter()
                .any(|p| state.failing_payloads.contains(p))
        {
            return Err(BrokerError::Publish("injected failure".into()));
        }
        state.sent.extend(payloads.iter().cloned());
        Ok(())
    }
}

/// An external receiver fed by hand: payloads pushed into the paired sender
/// come out of `receive_events` until shutdown.
#[derive(Debug)]
pub struct ChannelReceiver {
    source: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl ChannelReceiver {
    /// Create a receiver and the handle used to feed it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedSender<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                source: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl ExternalBrokerReceiver for ChannelReceiver {
    async fn receive_events(
        &self,
        shutdown: Shutdown,
    ) -> Result<mpsc::Receiver<Vec<u8>>, BrokerError> {
        let mut source = self
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(BrokerError::Closed)?;
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            loop {
                let payload = tokio::select! {
                    biased;
                    () = shutdown.wait() => break,
                    payload = source.recv() => payload,
                };
                let Some(payload) = payload else { break };
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// A subscriber that forwards every handled event to a channel.
#[derive(Debug)]
pub struct RecordingSubscriber<E> {
    name: String,
    tx: mpsc::UnboundedSender<E>,
}

impl<E: DomainEvent> RecordingSubscriber<E> {
    /// Create a subscriber named `name` and the receiving end of its
    /// recordings.
    #[must_use]
    pub fn new(name: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                name: name.to_owned(),
                tx,
            }),
            rx,
        )
    }
}

#[async_trait]
impl<E: DomainEvent> Subscriber<E> for RecordingSubscriber<E> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: E) -> Result<(), DomainError> {
        self.tx
            .send(event)
            .map_err(|_| DomainError::Infrastructure("recording dropped".into()))
    }
}
