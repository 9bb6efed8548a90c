//! Outbox contract: durable staging of encoded events awaiting relay.

use async_trait::async_trait;

use crate::error::DomainError;

/// A staged, already-encoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEvent {
    /// Staging identifier, increasing in arrival order.
    pub id: i64,
    /// Serializer envelope bytes.
    pub payload: Vec<u8>,
}

/// Source side of the outbox, drained by the relay.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Returns pending events in arrival order.
    async fn pull_events(&self) -> Result<Vec<OutboxEvent>, DomainError>;

    /// Excludes `events` from future pulls.
    async fn mark_events_as_sent(&self, events: &[OutboxEvent]) -> Result<(), DomainError>;
}
