//! Self-healing broker connection.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::{info, warn};

use shorturl_core::error::BrokerError;
use shorturl_core::shutdown::Shutdown;

use crate::backoff::{Backoff, ReconnectPolicy};
use crate::transport::{Connection, Connector};

/// Lifecycle of a [`ManagedConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A live connection is installed.
    Connected,
    /// The connection closed; waiting for the next attempt.
    Disconnected,
    /// A connection attempt is in progress.
    Reconnecting,
    /// Shut down for good.
    Closed,
}

/// Owns one live connection and replaces it whenever it closes.
///
/// A dedicated task watches the installed connection. When it closes, the
/// task walks `Disconnected -> Reconnecting -> Connected`, sleeping according
/// to the [`ReconnectPolicy`] before every attempt, and swaps the new handle
/// in under the write lock. Callers always fetch the handle through
/// [`ManagedConnection::current`], so they use the new connection on their
/// next operation.
pub struct ManagedConnection {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    current: RwLock<Arc<dyn Connection>>,
    state: watch::Sender<ConnectionState>,
    generation: watch::Sender<u64>,
}

impl fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("policy", &self.policy)
            .field("state", &*self.state.borrow())
            .field("generation", &*self.generation.borrow())
            .finish_non_exhaustive()
    }
}

impl ManagedConnection {
    /// Connects once and starts the reconnect task, which runs until
    /// `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if the first connection fails.
    pub async fn connect(
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
        shutdown: Shutdown,
    ) -> Result<Arc<Self>, BrokerError> {
        let connection = connector.connect().await?;
        let managed = Arc::new(Self {
            connector,
            policy,
            current: RwLock::new(connection),
            state: watch::Sender::new(ConnectionState::Connected),
            generation: watch::Sender::new(0),
        });
        tokio::spawn(Arc::clone(&managed).supervise(shutdown));
        Ok(managed)
    }

    /// The currently installed connection.
    pub async fn current(&self) -> Arc<dyn Connection> {
        Arc::clone(&*self.current.read().await)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observes lifecycle changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Observes replacements: the value increases every time a new
    /// connection is installed.
    #[must_use]
    pub fn watch_generation(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    async fn supervise(self: Arc<Self>, shutdown: Shutdown) {
        loop {
            let connection = self.current().await;
            tokio::select! {
                biased;
                () = shutdown.wait() => break,
                () = connection.closed() => {}
            }
            drop(connection);

            self.state.send_replace(ConnectionState::Disconnected);
            warn!("broker connection closed, reconnecting");

            if !self.reconnect(&shutdown).await {
                break;
            }
        }
        self.state.send_replace(ConnectionState::Closed);
        info!("broker connection supervisor stopped");
    }

    /// Retries until a connection is installed. Returns `false` if shutdown
    /// interrupted it.
    async fn reconnect(&self, shutdown: &Shutdown) -> bool {
        let mut backoff = Backoff::new(self.policy);
        loop {
            let delay = backoff.next_delay();
            tokio::select! {
                biased;
                () = shutdown.wait() => return false,
                () = tokio::time::sleep(delay) => {}
            }

            self.state.send_replace(ConnectionState::Reconnecting);
            let attempt = tokio::select! {
                biased;
                () = shutdown.wait() => return false,
                attempt = self.connector.connect() => attempt,
            };
            match attempt {
                Ok(connection) => {
                    *self.current.write().await = connection;
                    self.generation.send_modify(|generation| *generation += 1);
                    self.state.send_replace(ConnectionState::Connected);
                    info!(attempt = backoff.attempt(), "broker connection re-established");
                    return true;
                }
                Err(e) => {
                    warn!(
                        attempt = backoff.attempt(),
                        error = %e,
                        "broker reconnect attempt failed"
                    );
                    self.state.send_replace(ConnectionState::Disconnected);
                }
            }
        }
    }
}
