//! Aggregate (entity) abstraction.

use crate::event::DomainEvent;

/// An aggregate whose state is the left fold of its event stream.
///
/// Entities start from `Default` and are never persisted directly: only the
/// events they are folded from are.
pub trait Entity: Default + Send + Sync {
    /// The event type this entity is folded from.
    type Event: DomainEvent;

    /// Apply an event to mutate internal state.
    ///
    /// # Errors
    ///
    /// Returns a description of why the event cannot be applied to this
    /// entity, typically because it belongs to a different aggregate kind.
    fn on(&mut self, event: &Self::Event) -> Result<(), String>;
}
