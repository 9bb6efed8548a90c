//! In-process transport with fault injection.
//!
//! Topics are durable queues shared by every connection of one
//! [`InMemoryTransport`]. Deliveries are handed to subscribers round-robin and
//! stay unacknowledged until settled; closing the connections puts every
//! unacknowledged delivery back at the head of its queue.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use shorturl_core::error::BrokerError;

use crate::transport::{Acknowledger, Connection, Connector, Deliveries, Delivery};

struct Subscription {
    tx: mpsc::UnboundedSender<Delivery>,
    acknowledger: Arc<dyn Acknowledger>,
}

#[derive(Default)]
struct TopicQueue {
    ready: VecDeque<Vec<u8>>,
    unacked: HashMap<u64, Vec<u8>>,
    subscriptions: Vec<Subscription>,
    cursor: usize,
}

impl TopicQueue {
    fn dispatch(&mut self, next_tag: &mut u64) {
        while !self.subscriptions.is_empty() {
            let Some(payload) = self.ready.pop_front() else {
                break;
            };
            let index = self.cursor % self.subscriptions.len();
            let subscription = &self.subscriptions[index];
            *next_tag += 1;
            let tag = *next_tag;
            let delivery = Delivery::new(
                payload.clone(),
                tag,
                Arc::clone(&subscription.acknowledger),
            );
            if subscription.tx.send(delivery).is_ok() {
                self.unacked.insert(tag, payload);
                self.cursor = index + 1;
            } else {
                self.subscriptions.remove(index);
                self.ready.push_front(payload);
            }
        }
    }

    fn requeue_unacked(&mut self) {
        let mut unacked: Vec<(u64, Vec<u8>)> = self.unacked.drain().collect();
        unacked.sort_by_key(|(tag, _)| *tag);
        for (_, payload) in unacked.into_iter().rev() {
            self.ready.push_front(payload);
        }
    }
}

#[derive(Default)]
struct Hub {
    topics: HashMap<String, TopicQueue>,
    connections: HashMap<u64, watch::Sender<bool>>,
    next_connection: u64,
    next_tag: u64,
    connect_count: usize,
    failing_connects: u32,
    failing_publishes: u32,
    stalled_connects: bool,
}

impl Hub {
    fn ensure_open(&self, connection: u64) -> Result<(), BrokerError> {
        if self.connections.contains_key(&connection) {
            Ok(())
        } else {
            Err(BrokerError::Connection("connection closed".into()))
        }
    }
}

type SharedHub = Arc<Mutex<Hub>>;

fn lock(hub: &SharedHub) -> std::sync::MutexGuard<'_, Hub> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process broker used by tests and the single-process setup.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    hub: SharedHub,
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hub = lock(&self.hub);
        f.debug_struct("InMemoryTransport")
            .field("topics", &hub.topics.len())
            .field("connections", &hub.connections.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryTransport {
    /// Creates a transport with no topics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes every open connection. Their subscriptions end and their
    /// unacknowledged deliveries are requeued.
    pub fn sever_connections(&self) {
        let mut hub = lock(&self.hub);
        for (_, closed) in hub.connections.drain() {
            closed.send_replace(true);
        }
        for queue in hub.topics.values_mut() {
            queue.subscriptions.clear();
            queue.requeue_unacked();
        }
        debug!("in-memory transport severed all connections");
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        lock(&self.hub).failing_connects = count;
    }

    /// Makes every connection attempt hang until called again with `false`.
    pub fn stall_connects(&self, stalled: bool) {
        lock(&self.hub).stalled_connects = stalled;
    }

    /// Makes the next `count` publish calls fail as a whole.
    pub fn fail_next_publishes(&self, count: u32) {
        lock(&self.hub).failing_publishes = count;
    }

    /// Number of connections successfully opened so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        lock(&self.hub).connect_count
    }

    /// Payloads waiting in `topic` that are not handed out.
    #[must_use]
    pub fn queued(&self, topic: &str) -> Vec<Vec<u8>> {
        lock(&self.hub)
            .topics
            .get(topic)
            .map(|queue| queue.ready.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of deliveries of `topic` handed out but not settled.
    #[must_use]
    pub fn unacked(&self, topic: &str) -> usize {
        lock(&self.hub)
            .topics
            .get(topic)
            .map_or(0, |queue| queue.unacked.len())
    }
}

#[async_trait]
impl Connector for InMemoryTransport {
    async fn connect(&self) -> Result<Arc<dyn Connection>, BrokerError> {
        let stalled = lock(&self.hub).stalled_connects;
        if stalled {
            std::future::pending::<()>().await;
        }
        let mut hub = lock(&self.hub);
        if hub.failing_connects > 0 {
            hub.failing_connects -= 1;
            return Err(BrokerError::Connection("connection refused".into()));
        }
        hub.next_connection += 1;
        hub.connect_count += 1;
        let id = hub.next_connection;
        let (closed_tx, closed_rx) = watch::channel(false);
        hub.connections.insert(id, closed_tx);
        Ok(Arc::new(InMemoryConnection {
            id,
            hub: Arc::clone(&self.hub),
            closed: closed_rx,
        }))
    }
}

struct InMemoryConnection {
    id: u64,
    hub: SharedHub,
    closed: watch::Receiver<bool>,
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn publish(&self, topic: &str, payloads: &[Vec<u8>]) -> Result<(), BrokerError> {
        let mut hub = lock(&self.hub);
        hub.ensure_open(self.id)?;
        if hub.failing_publishes > 0 {
            hub.failing_publishes -= 1;
            return Err(BrokerError::Publish("transaction rolled back".into()));
        }
        let Hub {
            topics, next_tag, ..
        } = &mut *hub;
        let queue = topics.entry(topic.to_owned()).or_default();
        queue.ready.extend(payloads.iter().cloned());
        queue.dispatch(next_tag);
        Ok(())
    }

    async fn consume(&self, topic: &str) -> Result<Deliveries, BrokerError> {
        let mut hub = lock(&self.hub);
        hub.ensure_open(self.id)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let acknowledger = Arc::new(TopicAcknowledger {
            connection: self.id,
            topic: topic.to_owned(),
            hub: Arc::clone(&self.hub),
        });
        let Hub {
            topics, next_tag, ..
        } = &mut *hub;
        let queue = topics.entry(topic.to_owned()).or_default();
        queue.subscriptions.push(Subscription { tx, acknowledger });
        queue.dispatch(next_tag);
        Ok(rx)
    }

    async fn closed(&self) {
        let mut closed = self.closed.clone();
        // A dropped sender also means the connection is gone.
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

struct TopicAcknowledger {
    connection: u64,
    topic: String,
    hub: SharedHub,
}

impl TopicAcknowledger {
    fn settle(&self, tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let mut hub = lock(&self.hub);
        hub.ensure_open(self.connection)?;
        let Hub {
            topics, next_tag, ..
        } = &mut *hub;
        let queue = topics
            .get_mut(&self.topic)
            .ok_or_else(|| BrokerError::Connection(format!("unknown topic {}", self.topic)))?;
        let payload = queue
            .unacked
            .remove(&tag)
            .ok_or_else(|| BrokerError::Connection(format!("unknown delivery tag {tag}")))?;
        if requeue {
            queue.ready.push_front(payload);
            queue.dispatch(next_tag);
        }
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for TopicAcknowledger {
    async fn ack(&self, tag: u64) -> Result<(), BrokerError> {
        self.settle(tag, false)
    }

    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.settle(tag, requeue)
    }
}
