//! In-memory event store and outbox.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use shorturl_core::error::DomainError;
use shorturl_core::event::{DomainEvent, Stream};
use shorturl_core::outbox::{Outbox, OutboxEvent};
use shorturl_core::serializer::Serializer;
use shorturl_core::store::EventStore;

/// Event store kept in process memory.
///
/// When attached to an [`InMemoryOutbox`], every newly stored event is staged
/// there, mirroring the transactional staging of the `PostgreSQL` store.
pub struct InMemoryEventStore<E> {
    streams: Mutex<HashMap<String, Stream<E>>>,
    staging: Option<(Arc<InMemoryOutbox>, Arc<Serializer<E>>)>,
}

impl<E: DomainEvent> Default for InMemoryEventStore<E> {
    fn default() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            staging: None,
        }
    }
}

impl<E: DomainEvent> std::fmt::Debug for InMemoryEventStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InMemoryEventStore")
            .field("streams", &streams.len())
            .field("staging", &self.staging.is_some())
            .finish()
    }
}

impl<E: DomainEvent> InMemoryEventStore<E> {
    /// Creates a store that stages nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that stages new events, encoded by `serializer`, in
    /// `outbox`.
    #[must_use]
    pub fn with_outbox(outbox: Arc<InMemoryOutbox>, serializer: Arc<Serializer<E>>) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            staging: Some((outbox, serializer)),
        }
    }
}

#[async_trait]
impl<E: DomainEvent> EventStore<E> for InMemoryEventStore<E> {
    async fn append(&self, entity_id: &str, events: &[E]) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = streams.get(entity_id);

        let mut fresh: Vec<E> = Vec::with_capacity(events.len());
        for event in events {
            let stored = existing.is_some_and(|s| s.contains_version(event.version()));
            let repeated = fresh.iter().any(|f| f.version() == event.version());
            if stored || repeated {
                debug!(entity_id, version = event.version(), "event already stored, skipping");
                continue;
            }
            fresh.push(event.clone());
        }

        // Encode before mutating so a failure leaves the store untouched.
        let staged = match &self.staging {
            Some((outbox, serializer)) => {
                let payloads = fresh
                    .iter()
                    .map(|e| serializer.marshal(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Some((outbox, payloads))
            }
            None => None,
        };

        streams
            .entry(entity_id.to_owned())
            .or_insert_with(|| Stream::new(entity_id, Vec::new()))
            .append(fresh);

        if let Some((outbox, payloads)) = staged {
            for payload in payloads {
                outbox.stage(payload);
            }
        }

        Ok(())
    }

    async fn load(&self, entity_id: &str) -> Result<Stream<E>, DomainError> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .filter(|s| !s.is_empty())
            .cloned()
            .ok_or_else(|| DomainError::EntityNotFound(entity_id.to_owned()))
    }
}

#[derive(Debug, Default)]
struct OutboxState {
    next_id: i64,
    pending: Vec<OutboxEvent>,
}

/// Outbox kept in process memory. Marking an event as sent removes it.
#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    state: Mutex<OutboxState>,
}

impl InMemoryOutbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages an encoded event and returns its id.
    pub fn stage(&self, payload: Vec<u8>) -> i64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.next_id += 1;
        let id = state.next_id;
        state.pending.push(OutboxEvent { id, payload });
        id
    }

    /// Number of events not yet marked as sent.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn pull_events(&self) -> Result<Vec<OutboxEvent>, DomainError> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .clone())
    }

    async fn mark_events_as_sent(&self, events: &[OutboxEvent]) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .pending
            .retain(|pending| !events.iter().any(|sent| sent.id == pending.id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde::Deserialize;
    use shorturl_core::event::EventMetadata;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Ticked {
        metadata: EventMetadata,
    }

    impl Ticked {
        const EVENT_TYPE: &'static str = "test.ticked";

        fn new(entity_id: &str, version: i64) -> Self {
            Self {
                metadata: EventMetadata::new(
                    entity_id,
                    version,
                    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
                ),
            }
        }
    }

    impl DomainEvent for Ticked {
        fn event_type(&self) -> &'static str {
            Self::EVENT_TYPE
        }

        fn metadata(&self) -> &EventMetadata {
            &self.metadata
        }

        fn to_data(&self) -> Result<serde_json::Value, serde_json::Error> {
            serde_json::to_value(&self.metadata)
        }
    }

    fn decode_ticked(data: serde_json::Value) -> Result<Ticked, serde_json::Error> {
        #[derive(Deserialize)]
        struct Data {
            #[serde(flatten)]
            metadata: EventMetadata,
        }
        let data: Data = serde_json::from_value(data)?;
        Ok(Ticked {
            metadata: data.metadata,
        })
    }

    fn staged_store() -> (InMemoryEventStore<Ticked>, Arc<InMemoryOutbox>) {
        let outbox = Arc::new(InMemoryOutbox::new());
        let serializer = Arc::new(Serializer::new().bind(Ticked::EVENT_TYPE, decode_ticked));
        (
            InMemoryEventStore::with_outbox(Arc::clone(&outbox), serializer),
            outbox,
        )
    }

    fn versions(stream: &Stream<Ticked>) -> Vec<i64> {
        stream.events().iter().map(DomainEvent::version).collect()
    }

    #[tokio::test]
    async fn test_append_then_load_returns_sorted_stream() {
        // Arrange
        let store = InMemoryEventStore::new();

        // Act
        store
            .append("a", &[Ticked::new("a", 2), Ticked::new("a", 0), Ticked::new("a", 1)])
            .await
            .unwrap();
        let stream = store.load("a").await.unwrap();

        // Assert
        assert_eq!(versions(&stream), vec![0, 1, 2]);
        assert_eq!(stream.version(), 2);
    }

    #[tokio::test]
    async fn test_append_to_existing_stream_resorts() {
        let store = InMemoryEventStore::new();
        store.append("a", &[Ticked::new("a", 3)]).await.unwrap();

        store.append("a", &[Ticked::new("a", 1)]).await.unwrap();

        let stream = store.load("a").await.unwrap();
        assert_eq!(versions(&stream), vec![1, 3]);
        assert_eq!(stream.version(), 3);
    }

    #[tokio::test]
    async fn test_load_missing_fails_with_entity_not_found() {
        let store: InMemoryEventStore<Ticked> = InMemoryEventStore::new();

        let result = store.load("missing").await;

        assert!(matches!(result, Err(DomainError::EntityNotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_append_creates_nothing() {
        let store: InMemoryEventStore<Ticked> = InMemoryEventStore::new();

        store.append("a", &[]).await.unwrap();

        assert!(store.load("a").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_append_is_silently_skipped() {
        // Arrange
        let (store, outbox) = staged_store();
        store.append("a", &[Ticked::new("a", 0)]).await.unwrap();

        // Act
        let result = store
            .append("a", &[Ticked::new("a", 0), Ticked::new("a", 0)])
            .await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(versions(&store.load("a").await.unwrap()), vec![0]);
        assert_eq!(outbox.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_new_events_are_staged_in_outbox_in_order() {
        // Arrange
        let (store, outbox) = staged_store();
        let serializer = Serializer::new().bind(Ticked::EVENT_TYPE, decode_ticked);

        // Act
        store
            .append("a", &[Ticked::new("a", 0), Ticked::new("a", 1)])
            .await
            .unwrap();
        store.append("b", &[Ticked::new("b", 0)]).await.unwrap();

        // Assert
        let pending = outbox.pull_events().await.unwrap();
        let decoded: Vec<(String, i64)> = pending
            .iter()
            .map(|e| {
                let event = serializer.unmarshal(&e.payload).unwrap();
                (event.entity_id().to_owned(), event.version())
            })
            .collect();
        assert_eq!(
            decoded,
            vec![("a".to_owned(), 0), ("a".to_owned(), 1), ("b".to_owned(), 0)]
        );
        assert!(pending.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_mark_events_as_sent_excludes_them_from_pull() {
        // Arrange
        let outbox = InMemoryOutbox::new();
        let first = outbox.stage(b"one".to_vec());
        outbox.stage(b"two".to_vec());
        let pulled = outbox.pull_events().await.unwrap();

        // Act
        outbox.mark_events_as_sent(&pulled[..1]).await.unwrap();

        // Assert
        let remaining = outbox.pull_events().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_ne!(remaining[0].id, first);
        assert_eq!(remaining[0].payload, b"two".to_vec());
    }
}
