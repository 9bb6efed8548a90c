//! In-process publish/subscribe dispatch.
//!
//! Every subscriber owns a mailbox: an unbounded queue drained by a dedicated
//! task. Publishing enqueues the event into the mailbox of each interested
//! subscriber and returns immediately, so subscribers never block each other
//! and a single subscriber observes events in publish order.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::DomainError;
use crate::event::DomainEvent;

/// A local consumer of published events.
#[async_trait]
pub trait Subscriber<E>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Handles one event. Errors are logged by the broker and dropped.
    async fn handle(&self, event: E) -> Result<(), DomainError>;
}

/// Identity of a subscriber: the address of the instance, so two distinct
/// subscribers sharing a name stay apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SubscriberId(usize);

impl SubscriberId {
    fn of<E>(subscriber: &dyn Subscriber<E>) -> Self {
        Self(std::ptr::from_ref(subscriber).cast::<()>() as usize)
    }
}

struct Mailbox<E> {
    name: String,
    tx: mpsc::UnboundedSender<E>,
}

struct Registry<E> {
    mailboxes: HashMap<SubscriberId, Mailbox<E>>,
    all: Vec<SubscriberId>,
    by_type: HashMap<String, Vec<SubscriberId>>,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            mailboxes: HashMap::new(),
            all: Vec::new(),
            by_type: HashMap::new(),
        }
    }
}

impl<E> Registry<E> {
    fn is_referenced(&self, id: SubscriberId) -> bool {
        self.all.contains(&id) || self.by_type.values().any(|ids| ids.contains(&id))
    }

    fn remove_from_types(&mut self, id: SubscriberId) {
        for ids in self.by_type.values_mut() {
            ids.retain(|i| *i != id);
        }
        self.by_type.retain(|_, ids| !ids.is_empty());
    }
}

/// In-process event broker.
pub struct Broker<E> {
    registry: RwLock<Registry<E>>,
}

impl<E> Default for Broker<E> {
    fn default() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
        }
    }
}

impl<E> std::fmt::Debug for Broker<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Broker")
            .field("subscribers", &registry.mailboxes.len())
            .field("all", &registry.all.len())
            .field("types", &registry.by_type.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<E: DomainEvent> Broker<E> {
    /// Creates a broker with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to the given event types, or to every event when
    /// `event_types` is empty.
    ///
    /// Subscriptions are de-duplicated per subscriber instance: subscribing
    /// the same instance twice to a type, or to a type while it already
    /// receives every event, changes nothing.
    ///
    /// # Panics
    ///
    /// Spawns the subscriber's mailbox task, so it must be called from within
    /// a tokio runtime.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber<E>>, event_types: &[&str]) {
        let id = SubscriberId::of(subscriber.as_ref());
        let name = subscriber.name().to_owned();
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);

        if !registry.mailboxes.contains_key(&id) {
            if registry.mailboxes.values().any(|mailbox| mailbox.name == name) {
                warn!(subscriber = %name, "another subscriber already uses this name");
            }
            registry.mailboxes.insert(
                id,
                Mailbox {
                    name: name.clone(),
                    tx: spawn_mailbox(subscriber),
                },
            );
        }

        if event_types.is_empty() {
            if !registry.all.contains(&id) {
                registry.all.push(id);
            }
            registry.remove_from_types(id);
            debug!(subscriber = %name, "subscribed to all events");
            return;
        }

        if registry.all.contains(&id) {
            return;
        }

        for event_type in event_types {
            let ids = registry.by_type.entry((*event_type).to_owned()).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        debug!(subscriber = %name, ?event_types, "subscribed to event types");
    }

    /// Removes a subscription.
    ///
    /// With no `event_types` the subscriber is removed from every type and
    /// from "all events". Otherwise only the listed per-type subscriptions are
    /// removed; a subscription to all events is left untouched.
    pub fn unsubscribe(&self, subscriber: &dyn Subscriber<E>, event_types: &[&str]) {
        let id = SubscriberId::of(subscriber);
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);

        if event_types.is_empty() {
            registry.all.retain(|i| *i != id);
            registry.remove_from_types(id);
        } else {
            for event_type in event_types {
                if let Some(ids) = registry.by_type.get_mut(*event_type) {
                    ids.retain(|i| *i != id);
                }
            }
            registry.by_type.retain(|_, ids| !ids.is_empty());
        }

        if !registry.is_referenced(id) {
            // Dropping the sender lets the mailbox task drain and exit.
            registry.mailboxes.remove(&id);
        }
        debug!(subscriber = subscriber.name(), ?event_types, "unsubscribed");
    }

    /// Dispatches `event` to every interested subscriber without waiting for
    /// them to handle it.
    pub fn publish(&self, event: &E) {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        let typed = registry
            .by_type
            .get(event.event_type())
            .map(Vec::as_slice)
            .unwrap_or_default();

        for id in registry.all.iter().chain(typed) {
            let Some(mailbox) = registry.mailboxes.get(id) else {
                continue;
            };
            if mailbox.tx.send(event.clone()).is_err() {
                warn!(
                    subscriber = %mailbox.name,
                    event_type = event.event_type(),
                    "subscriber mailbox closed"
                );
            }
        }
    }

    /// Number of subscribers currently holding a mailbox.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .mailboxes
            .len()
    }
}

fn spawn_mailbox<E: DomainEvent>(subscriber: Arc<dyn Subscriber<E>>) -> mpsc::UnboundedSender<E> {
    let (tx, mut rx) = mpsc::unbounded_channel::<E>();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let event_type = event.event_type();
            if let Err(e) = subscriber.handle(event).await {
                warn!(
                    subscriber = subscriber.name(),
                    event_type,
                    error = %e,
                    "subscriber failed to handle event"
                );
            }
        }
        debug!(subscriber = subscriber.name(), "mailbox closed");
    });
    tx
}
