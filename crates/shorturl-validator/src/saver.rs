//! Persists verifications coming back from the external broker.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use shorturl_core::error::BrokerError;
use shorturl_core::external::ExternalBrokerReceiver;
use shorturl_core::repository::Repository;
use shorturl_core::serializer::Serializer;
use shorturl_core::shutdown::Shutdown;
use shorturl_shortener::domain::events::{UrlEvent, UrlEventKind};

/// Counters accumulated by [`VerificationSaver::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SaverStats {
    /// Verifications saved (including duplicates the store ignored).
    pub saved: usize,
    /// Non-verification events skipped.
    pub ignored: usize,
    /// Payloads that could not be decoded.
    pub dropped: usize,
    /// Saves that failed.
    pub failed: usize,
}

/// Saves `*Verified` events through the repository so later loads see them.
pub struct VerificationSaver {
    receiver: Arc<dyn ExternalBrokerReceiver>,
    repository: Repository<UrlEvent>,
    serializer: Arc<Serializer<UrlEvent>>,
}

impl std::fmt::Debug for VerificationSaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationSaver").finish_non_exhaustive()
    }
}

impl VerificationSaver {
    /// Creates the saver.
    #[must_use]
    pub fn new(
        receiver: Arc<dyn ExternalBrokerReceiver>,
        repository: Repository<UrlEvent>,
        serializer: Arc<Serializer<UrlEvent>>,
    ) -> Self {
        Self {
            receiver,
            repository,
            serializer,
        }
    }

    /// Saves verifications until the receiver's channel closes.
    ///
    /// # Errors
    ///
    /// Returns the receiver's error if consuming cannot start.
    pub async fn run(&self, shutdown: Shutdown) -> Result<SaverStats, BrokerError> {
        let mut payloads = self.receiver.receive_events(shutdown).await?;
        let mut stats = SaverStats::default();
        info!("verification saver started");

        while let Some(payload) = payloads.recv().await {
            let event = match self.serializer.unmarshal(&payload) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "dropping undecodable payload");
                    stats.dropped += 1;
                    continue;
                }
            };

            if !matches!(
                event.kind,
                UrlEventKind::ShortUrlVerified(_) | UrlEventKind::LoadBalancedUrlVerified(_)
            ) {
                debug!(event_type = event.kind.event_type(), "ignoring non-verification event");
                stats.ignored += 1;
                continue;
            }

            match self.repository.save(std::slice::from_ref(&event)).await {
                Ok(()) => stats.saved += 1,
                Err(e) => {
                    stats.failed += 1;
                    error!(
                        entity_id = %event.metadata.entity_id,
                        version = event.metadata.version,
                        error = %e,
                        "failed to save verification"
                    );
                }
            }
        }

        info!(?stats, "verification saver stopped");
        Ok(stats)
    }
}
