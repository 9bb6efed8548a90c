//! Domain error types.

use thiserror::Error;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No event stream exists for the entity.
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// An entity could not fold one of the events of its stream.
    ///
    /// This signals a mismatch between the stored events and the aggregate
    /// loading them, never a condition worth retrying.
    #[error("unhandled event {event_type}: {reason}")]
    UnhandledEvent {
        /// Type name of the event that failed to fold.
        event_type: String,
        /// Why the fold rejected it.
        reason: String,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

/// Errors raised while mapping events to and from their wire encoding.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// The event could not be encoded.
    #[error("unable to encode event: {0}")]
    UnableToEncode(String),

    /// The bytes are not a valid `{type, data}` envelope, or `data` does not
    /// match the registered shape.
    #[error("unable to decode event: {0}")]
    UnableToDecode(String),

    /// The envelope names a type that was never bound to the serializer.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
}

impl From<SerializationError> for DomainError {
    fn from(err: SerializationError) -> Self {
        Self::Infrastructure(err.to_string())
    }
}

/// Errors surfaced by external broker clients.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Establishing or using the transport connection failed.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// A publish batch was rejected and rolled back.
    #[error("broker publish failed: {0}")]
    Publish(String),

    /// The client was shut down.
    #[error("broker client closed")]
    Closed,
}
