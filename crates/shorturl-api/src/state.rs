//! Shared application state.

use std::sync::{Arc, Mutex};

use shorturl_core::clock::Clock;
use shorturl_core::repository::Repository;
use shorturl_core::rng::DeterministicRng;
use shorturl_shortener::domain::events::UrlEvent;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Loads and saves URL aggregates.
    pub repository: Repository<UrlEvent>,
    /// Timestamps new events.
    pub clock: Arc<dyn Clock + Send + Sync>,
    /// Drives the load-balanced redirect choice.
    pub rng: Arc<Mutex<dyn DeterministicRng + Send>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        repository: Repository<UrlEvent>,
        clock: Arc<dyn Clock + Send + Sync>,
        rng: Arc<Mutex<dyn DeterministicRng + Send>>,
    ) -> Self {
        Self {
            repository,
            clock,
            rng,
        }
    }
}
