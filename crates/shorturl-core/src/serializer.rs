//! Tagged wire encoding for domain events.
//!
//! Events travel as a JSON envelope `{"type": "...", "data": {...}}`. The
//! serializer keeps a registry from type name to decoder; any event can be
//! marshalled, but only bound types can be unmarshalled.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SerializationError;
use crate::event::DomainEvent;

/// Decodes the `data` part of an envelope into a concrete event.
pub type Decoder<E> = fn(serde_json::Value) -> Result<E, serde_json::Error>;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    data: serde_json::Value,
}

/// Bidirectional mapping between events and their tagged byte encoding.
#[derive(Debug, Clone)]
pub struct Serializer<E> {
    registry: HashMap<&'static str, Decoder<E>>,
}

impl<E> Default for Serializer<E> {
    fn default() -> Self {
        Self {
            registry: HashMap::new(),
        }
    }
}

impl<E: DomainEvent> Serializer<E> {
    /// Creates a serializer with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the decoder for `event_type`, replacing any earlier binding.
    #[must_use]
    pub fn bind(mut self, event_type: &'static str, decoder: Decoder<E>) -> Self {
        self.registry.insert(event_type, decoder);
        self
    }

    /// Returns `true` if `event_type` can be unmarshalled.
    #[must_use]
    pub fn is_bound(&self, event_type: &str) -> bool {
        self.registry.contains_key(event_type)
    }

    /// Encodes an event as a `{type, data}` envelope.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError::UnableToEncode` if the payload cannot be
    /// converted to JSON.
    pub fn marshal(&self, event: &E) -> Result<Vec<u8>, SerializationError> {
        let envelope = Envelope {
            event_type: event.event_type().to_owned(),
            data: event
                .to_data()
                .map_err(|e| SerializationError::UnableToEncode(e.to_string()))?,
        };
        serde_json::to_vec(&envelope).map_err(|e| SerializationError::UnableToEncode(e.to_string()))
    }

    /// Decodes an envelope produced by [`Serializer::marshal`].
    ///
    /// # Errors
    ///
    /// Returns `UnableToDecode` for malformed bytes or data, and
    /// `UnknownEventType` when the envelope names an unbound type.
    pub fn unmarshal(&self, bytes: &[u8]) -> Result<E, SerializationError> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| SerializationError::UnableToDecode(e.to_string()))?;
        let decoder = self
            .registry
            .get(envelope.event_type.as_str())
            .ok_or(SerializationError::UnknownEventType(envelope.event_type))?;
        decoder(envelope.data).map_err(|e| SerializationError::UnableToDecode(e.to_string()))
    }

    /// Reads only the type tag of an envelope without decoding its data.
    ///
    /// # Errors
    ///
    /// Returns `UnableToDecode` if the bytes are not an envelope.
    pub fn peek_type(bytes: &[u8]) -> Result<String, SerializationError> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| SerializationError::UnableToDecode(e.to_string()))?;
        Ok(envelope.event_type)
    }
}
