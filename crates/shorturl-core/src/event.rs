//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Entity/stream this event belongs to.
    pub entity_id: String,
    /// Monotonically increasing version within the entity stream.
    pub version: i64,
    /// Timestamp of event creation.
    pub happened_on: DateTime<Utc>,
}

impl EventMetadata {
    /// Creates metadata for an event of `entity_id` at `version`.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, version: i64, happened_on: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            version,
            happened_on,
        }
    }
}

/// Trait that all domain events implement.
pub trait DomainEvent: Clone + Send + Sync + std::fmt::Debug + 'static {
    /// Returns the stable event type name (used for serialization routing).
    fn event_type(&self) -> &'static str;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;

    /// Encodes the type-specific fields of the event.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error if the payload cannot be
    /// represented as JSON.
    fn to_data(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Entity the event belongs to.
    fn entity_id(&self) -> &str {
        &self.metadata().entity_id
    }

    /// Version of the event within its entity stream.
    fn version(&self) -> i64 {
        self.metadata().version
    }
}

/// Ordered sequence of events for one entity.
///
/// Events are kept sorted ascending by version; the stream version is the
/// highest version present.
#[derive(Debug, Clone)]
pub struct Stream<E> {
    entity_id: String,
    events: Vec<E>,
    version: i64,
}

impl<E: DomainEvent> Stream<E> {
    /// Builds a stream from `events`, sorting them by version.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, events: Vec<E>) -> Self {
        let mut stream = Self {
            entity_id: entity_id.into(),
            events: Vec::with_capacity(events.len()),
            version: 0,
        };
        stream.append(events);
        stream
    }

    /// Appends events, re-sorting and recomputing the version.
    pub fn append(&mut self, events: impl IntoIterator<Item = E>) {
        self.events.extend(events);
        self.events.sort_by_key(DomainEvent::version);
        self.version = self.events.last().map_or(0, DomainEvent::version);
    }

    /// Returns `true` if an event with `version` is already part of the stream.
    #[must_use]
    pub fn contains_version(&self, version: i64) -> bool {
        self.events
            .binary_search_by_key(&version, DomainEvent::version)
            .is_ok()
    }

    /// Entity identifier.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Events in version order.
    #[must_use]
    pub fn events(&self) -> &[E] {
        &self.events
    }

    /// Current version (max version present).
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns `true` if the stream holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Consumes the stream, returning its ordered events.
    #[must_use]
    pub fn into_events(self) -> Vec<E> {
        self.events
    }
}
