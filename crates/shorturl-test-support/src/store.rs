//! Test stores: mock `EventStore` implementations for tests.

use async_trait::async_trait;
use shorturl_core::error::DomainError;
use shorturl_core::event::{DomainEvent, Stream};
use shorturl_core::store::EventStore;

/// An event store that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug, Default)]
pub struct FailingEventStore;

#[async_trait]
impl<E: DomainEvent> EventStore<E> for FailingEventStore {
    async fn append(&self, _entity_id: &str, _events: &[E]) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn load(&self, _entity_id: &str) -> Result<Stream<E>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
