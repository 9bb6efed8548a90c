//! Shorturl Core: shared event-sourcing abstractions.
//!
//! Events, streams, the store and outbox contracts, the repository that
//! folds streams into aggregates, the in-process broker and the contracts of
//! the external broker. It contains no infrastructure code.

pub mod aggregate;
pub mod broker;
pub mod clock;
pub mod error;
pub mod event;
pub mod external;
pub mod outbox;
pub mod repository;
pub mod rng;
pub mod serializer;
pub mod shutdown;
pub mod store;
