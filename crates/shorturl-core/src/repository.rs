//! Aggregate repository: folds event streams into entities and saves events.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::aggregate::Entity;
use crate::broker::Broker;
use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::store::EventStore;

/// Loads entities by replaying their streams and saves new events.
///
/// Saved events are appended to the store first and only then published on
/// the in-process broker, so subscribers are never told about facts that
/// were not persisted.
pub struct Repository<E: DomainEvent> {
    store: Arc<dyn EventStore<E>>,
    broker: Arc<Broker<E>>,
}

impl<E: DomainEvent> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            broker: Arc::clone(&self.broker),
        }
    }
}

impl<E: DomainEvent> Repository<E> {
    /// Creates a repository over `store` that publishes on `broker`.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore<E>>, broker: Arc<Broker<E>>) -> Self {
        Self { store, broker }
    }

    /// Persists `events`, grouped per entity, then publishes them.
    ///
    /// Empty input is a no-op. Publication is fire-and-forget and cannot
    /// fail the save.
    ///
    /// # Errors
    ///
    /// Returns the store error of the first entity whose append failed.
    /// Events of that entity and of every later entity are not published.
    #[instrument(skip_all, fields(count = events.len()))]
    pub async fn save(&self, events: &[E]) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut groups: Vec<(&str, Vec<E>)> = Vec::new();
        for event in events {
            match groups.iter_mut().find(|(id, _)| *id == event.entity_id()) {
                Some((_, group)) => group.push(event.clone()),
                None => groups.push((event.entity_id(), vec![event.clone()])),
            }
        }

        for (entity_id, group) in &groups {
            self.store.append(entity_id, group).await?;
            for event in group {
                self.broker.publish(event);
            }
            debug!(entity_id, count = group.len(), "events saved");
        }

        Ok(())
    }

    /// Rebuilds the entity `entity_id` and returns it with its stream version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EntityNotFound` if the entity has no events,
    /// `DomainError::UnhandledEvent` if the entity rejects one of them, and
    /// any store error unchanged.
    #[instrument(skip(self))]
    pub async fn load<T>(&self, entity_id: &str) -> Result<(T, i64), DomainError>
    where
        T: Entity<Event = E>,
    {
        let stream = self.store.load(entity_id).await?;
        if stream.is_empty() {
            return Err(DomainError::EntityNotFound(entity_id.to_owned()));
        }

        let mut entity = T::default();
        for event in stream.events() {
            entity
                .on(event)
                .map_err(|reason| DomainError::UnhandledEvent {
                    event_type: event.event_type().to_owned(),
                    reason,
                })?;
        }

        Ok((entity, stream.version()))
    }
}
