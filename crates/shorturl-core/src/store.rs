//! Event store abstraction.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::event::{DomainEvent, Stream};

/// Durable append-only per-entity event log.
///
/// Appends for different entities may run concurrently. Concurrent appends to
/// the same entity rely on the backing store's own transactions.
#[async_trait]
pub trait EventStore<E: DomainEvent>: Send + Sync {
    /// Append events to the stream of `entity_id`.
    ///
    /// Empty input is a no-op. An event whose `(entity_id, version)` is
    /// already stored is skipped without error so redelivered events can be
    /// appended again safely.
    async fn append(&self, entity_id: &str, events: &[E]) -> Result<(), DomainError>;

    /// Load the stream of `entity_id`, ordered by version.
    ///
    /// Fails with `DomainError::EntityNotFound` if nothing was ever appended.
    async fn load(&self, entity_id: &str) -> Result<Stream<E>, DomainError>;
}
