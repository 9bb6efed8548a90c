//! Event store and outbox implementations.
//!
//! `PostgreSQL` backs production: every newly stored event is staged in the
//! outbox inside the same transaction. The in-memory variants share those
//! semantics and back tests and the single-process setup.

pub mod memory;
pub mod pg_event_store;
pub mod pg_outbox;
pub mod schema;

fn infrastructure(err: impl std::fmt::Display) -> shorturl_core::error::DomainError {
    shorturl_core::error::DomainError::Infrastructure(err.to_string())
}
