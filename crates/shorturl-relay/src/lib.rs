//! Outbox relay.
//!
//! The [`redirector::Redirector`] drains the outbox on a fixed interval and
//! forwards every staged event to the external broker. Delivery is
//! at-least-once: an event leaves the outbox only after a successful send.

pub mod redirector;
