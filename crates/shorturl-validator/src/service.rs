//! Validates newly shortened URLs and announces the ones that pass.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use shorturl_core::clock::Clock;
use shorturl_core::error::BrokerError;
use shorturl_core::external::{ExternalBrokerReceiver, ExternalBrokerSender};
use shorturl_core::serializer::Serializer;
use shorturl_core::shutdown::Shutdown;
use shorturl_shortener::domain::events::{
    LoadBalancedUrlVerified, ShortUrlVerified, UrlEvent, UrlEventKind,
};

use crate::validator::UrlValidator;

/// Counters accumulated by [`ValidatorService::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorStats {
    /// Payloads received.
    pub received: usize,
    /// Verifications emitted.
    pub verified: usize,
    /// URLs that failed validation or whose check errored.
    pub rejected: usize,
    /// Payloads that could not be decoded.
    pub dropped: usize,
    /// Batches of verifications the sender refused.
    pub emit_failures: usize,
}

/// Outcome of handling one payload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Handled {
    /// Verifications emitted.
    pub verified: usize,
    /// URLs that did not pass.
    pub rejected: usize,
    /// The payload was undecodable and dropped.
    pub dropped: bool,
    /// The sender refused the verifications.
    pub emit_failed: bool,
}

/// Consumes `*Created` events, validates their URLs and emits `*Verified`
/// events.
///
/// A verification of a single URL gets the creation version plus one; the
/// URL at index `i` of a load-balanced set gets the creation version plus
/// `i + 1`. Redelivered creations are validated again and produce the same
/// versions, which downstream saves ignore.
pub struct ValidatorService {
    receiver: Arc<dyn ExternalBrokerReceiver>,
    sender: Arc<dyn ExternalBrokerSender>,
    validator: Arc<dyn UrlValidator>,
    serializer: Arc<Serializer<UrlEvent>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ValidatorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorService")
            .field("validator", &self.validator.name())
            .finish_non_exhaustive()
    }
}

impl ValidatorService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        receiver: Arc<dyn ExternalBrokerReceiver>,
        sender: Arc<dyn ExternalBrokerSender>,
        validator: Arc<dyn UrlValidator>,
        serializer: Arc<Serializer<UrlEvent>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            receiver,
            sender,
            validator,
            serializer,
            clock,
        }
    }

    /// Handles payloads until the receiver's channel closes, which happens
    /// once `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns the receiver's error if consuming cannot start.
    pub async fn run(&self, shutdown: Shutdown) -> Result<ValidatorStats, BrokerError> {
        let mut payloads = self.receiver.receive_events(shutdown).await?;
        let mut stats = ValidatorStats::default();
        info!("validator service started");

        while let Some(payload) = payloads.recv().await {
            let handled = self.handle_payload(&payload).await;
            stats.received += 1;
            stats.verified += handled.verified;
            stats.rejected += handled.rejected;
            stats.dropped += usize::from(handled.dropped);
            stats.emit_failures += usize::from(handled.emit_failed);
        }

        info!(?stats, "validator service stopped");
        Ok(stats)
    }

    /// Handles one payload. Undecodable payloads are logged and dropped;
    /// anything but a creation is ignored.
    #[instrument(skip_all, fields(bytes = payload.len()))]
    pub async fn handle_payload(&self, payload: &[u8]) -> Handled {
        let event = match self.serializer.unmarshal(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "dropping undecodable payload");
                return Handled {
                    dropped: true,
                    ..Handled::default()
                };
            }
        };

        let entity_id = event.metadata.entity_id.as_str();
        let created_version = event.metadata.version;
        let mut handled = Handled::default();
        let mut verifications = Vec::new();

        match &event.kind {
            UrlEventKind::ShortUrlCreated(created) => {
                if self.passes(&created.original_url).await {
                    verifications.push(UrlEvent::new(
                        entity_id,
                        created_version + 1,
                        self.clock.now(),
                        ShortUrlVerified {
                            url: created.original_url.clone(),
                        },
                    ));
                } else {
                    handled.rejected += 1;
                }
            }
            UrlEventKind::LoadBalancedUrlCreated(created) => {
                for (offset, url) in (1_i64..).zip(&created.original_urls) {
                    if self.passes(url).await {
                        verifications.push(UrlEvent::new(
                            entity_id,
                            created_version + offset,
                            self.clock.now(),
                            LoadBalancedUrlVerified { url: url.clone() },
                        ));
                    } else {
                        handled.rejected += 1;
                    }
                }
            }
            UrlEventKind::ShortUrlVerified(_) | UrlEventKind::LoadBalancedUrlVerified(_) => {
                debug!(event_type = event.kind.event_type(), "ignoring non-creation event");
                return handled;
            }
        }

        if verifications.is_empty() {
            return handled;
        }

        let encoded: Result<Vec<Vec<u8>>, _> = verifications
            .iter()
            .map(|verification| self.serializer.marshal(verification))
            .collect();
        let sent = match encoded {
            Ok(payloads) => self
                .sender
                .send_events(&payloads)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match sent {
            Ok(()) => {
                handled.verified = verifications.len();
                info!(entity_id, count = handled.verified, "verifications emitted");
            }
            Err(reason) => {
                handled.emit_failed = true;
                error!(entity_id, error = %reason, "failed to emit verifications");
            }
        }
        handled
    }

    async fn passes(&self, url: &str) -> bool {
        match self.validator.validate_url(url).await {
            Ok(valid) => {
                debug!(url, valid, "url validated");
                valid
            }
            Err(e) => {
                warn!(url, error = %e, "validation aborted");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use shorturl_core::shutdown;
    use shorturl_shortener::domain::aggregates::{LoadBalancedUrl, ShortUrl};
    use shorturl_shortener::domain::events::serializer;
    use shorturl_test_support::{ChannelReceiver, FixedClock, RecordingSender, fixed_time};

    use super::*;
    use crate::error::ValidationError;

    /// Accepts every URL except the ones listed; errors on "https://error.example".
    struct Allow(Vec<&'static str>);

    #[async_trait]
    impl UrlValidator for Allow {
        fn name(&self) -> &'static str {
            "allow"
        }

        async fn validate_url(&self, url: &str) -> Result<bool, ValidationError> {
            if url == "https://error.example" {
                return Err(ValidationError::Check {
                    url: url.to_owned(),
                    reason: "boom".into(),
                });
            }
            Ok(!self.0.contains(&url))
        }
    }

    fn service(
        receiver: Arc<dyn ExternalBrokerReceiver>,
        sender: Arc<RecordingSender>,
        rejected: Vec<&'static str>,
    ) -> ValidatorService {
        ValidatorService::new(
            receiver,
            sender,
            Arc::new(Allow(rejected)),
            Arc::new(serializer()),
            Arc::new(FixedClock::default()),
        )
    }

    fn decode(payloads: &[Vec<u8>]) -> Vec<UrlEvent> {
        let serializer = serializer();
        payloads
            .iter()
            .map(|p| serializer.unmarshal(p).unwrap())
            .collect()
    }

    fn unused_receiver() -> Arc<dyn ExternalBrokerReceiver> {
        Arc::new(ChannelReceiver::new().0)
    }

    #[tokio::test]
    async fn test_valid_short_url_is_verified_at_next_version() {
        // Arrange
        let sender = Arc::new(RecordingSender::new());
        let service = service(unused_receiver(), sender.clone(), vec![]);
        let created = ShortUrl::shorten("https://google.com", &FixedClock::default());
        let payload = serializer().marshal(&created).unwrap();

        // Act
        let handled = service.handle_payload(&payload).await;

        // Assert
        assert_eq!(handled.verified, 1);
        assert_eq!(
            decode(&sender.sent()),
            vec![UrlEvent::new(
                "cv6VxVdu",
                1,
                fixed_time(),
                ShortUrlVerified {
                    url: "https://google.com".into()
                }
            )]
        );
    }

    #[tokio::test]
    async fn test_load_balanced_urls_are_verified_individually_with_offset_versions() {
        // Arrange
        let sender = Arc::new(RecordingSender::new());
        let service = service(unused_receiver(), sender.clone(), vec!["https://b.example"]);
        let urls: Vec<String> = ["https://a.example", "https://b.example", "https://c.example"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        let created = LoadBalancedUrl::shorten(&urls, &FixedClock::default());
        let hash = created.metadata.entity_id.clone();
        let payload = serializer().marshal(&created).unwrap();

        // Act
        let handled = service.handle_payload(&payload).await;

        // Assert
        assert_eq!(handled.verified, 2);
        assert_eq!(handled.rejected, 1);
        let sent = decode(&sender.sent());
        assert!(sent.iter().all(|e| e.metadata.entity_id == hash));
        let versions: Vec<(i64, UrlEventKind)> = sent
            .into_iter()
            .map(|e| (e.metadata.version, e.kind))
            .collect();
        assert_eq!(
            versions,
            vec![
                (1, LoadBalancedUrlVerified { url: "https://a.example".into() }.into()),
                (3, LoadBalancedUrlVerified { url: "https://c.example".into() }.into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_or_erroring_url_emits_nothing() {
        let sender = Arc::new(RecordingSender::new());
        let service = service(unused_receiver(), sender.clone(), vec!["https://bad.example"]);

        for url in ["https://bad.example", "https://error.example"] {
            let created = ShortUrl::shorten(url, &FixedClock::default());
            let handled = service.handle_payload(&serializer().marshal(&created).unwrap()).await;
            assert_eq!(handled.rejected, 1);
        }

        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_dropped() {
        let sender = Arc::new(RecordingSender::new());
        let service = service(unused_receiver(), sender.clone(), vec![]);

        let garbage = service.handle_payload(b"not json").await;
        let unknown = service
            .handle_payload(br#"{"type":"short_url.deleted","data":{}}"#)
            .await;

        assert!(garbage.dropped);
        assert!(unknown.dropped);
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_verified_events_are_ignored() {
        let sender = Arc::new(RecordingSender::new());
        let service = service(unused_receiver(), sender.clone(), vec![]);
        let verified = UrlEvent::new(
            "cv6VxVdu",
            1,
            fixed_time(),
            ShortUrlVerified {
                url: "https://google.com".into(),
            },
        );

        let handled = service
            .handle_payload(&serializer().marshal(&verified).unwrap())
            .await;

        assert_eq!(handled, Handled::default());
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_refused_emit_is_reported() {
        let sender = Arc::new(RecordingSender::new());
        sender.fail_all();
        let service = service(unused_receiver(), sender.clone(), vec![]);
        let created = ShortUrl::shorten("https://google.com", &FixedClock::default());

        let handled = service
            .handle_payload(&serializer().marshal(&created).unwrap())
            .await;

        assert!(handled.emit_failed);
        assert_eq!(handled.verified, 0);
    }

    #[tokio::test]
    async fn test_run_consumes_until_channel_closes() {
        // Arrange
        let (receiver, feed) = ChannelReceiver::new();
        let sender = Arc::new(RecordingSender::new());
        let service = service(Arc::new(receiver), sender.clone(), vec![]);
        let (_trigger, shutdown) = shutdown::channel();
        let created = ShortUrl::shorten("https://google.com", &FixedClock::default());
        feed.send(serializer().marshal(&created).unwrap()).unwrap();
        feed.send(b"garbage".to_vec()).unwrap();
        drop(feed);

        // Act
        let stats = service.run(shutdown).await.unwrap();

        // Assert
        assert_eq!(stats.received, 2);
        assert_eq!(stats.verified, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(sender.sent().len(), 1);
    }
}
