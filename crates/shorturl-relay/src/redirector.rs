//! Polling relay from the outbox to the external broker.

use std::slice;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use shorturl_core::error::DomainError;
use shorturl_core::external::ExternalBrokerSender;
use shorturl_core::outbox::Outbox;
use shorturl_core::shutdown::Shutdown;

/// Shortest pause the relay accepts between two polls.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Relay settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectorConfig {
    /// Pause between two polls of the outbox.
    pub interval: Duration,
}

impl Default for RedirectorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Outcome of one relay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Events pulled from the outbox.
    pub pulled: usize,
    /// Events sent and marked as sent.
    pub sent: usize,
    /// Events whose send failed; they stay pending.
    pub failed: usize,
    /// `false` if marking the sent events failed.
    pub marked: bool,
}

/// Totals accumulated by [`Redirector::start`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Completed passes, including failed pulls.
    pub ticks: usize,
    /// Events sent.
    pub sent: usize,
    /// Failed sends.
    pub failed: usize,
    /// Passes aborted because the outbox could not be read.
    pub pull_errors: usize,
}

/// Drains the outbox into the external broker.
pub struct Redirector {
    outbox: Arc<dyn Outbox>,
    sender: Arc<dyn ExternalBrokerSender>,
    config: RedirectorConfig,
}

impl std::fmt::Debug for Redirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redirector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Redirector {
    /// Creates a relay from `outbox` to `sender`.
    ///
    /// An interval below [`MIN_INTERVAL`] is raised to it.
    #[must_use]
    pub fn new(
        outbox: Arc<dyn Outbox>,
        sender: Arc<dyn ExternalBrokerSender>,
        mut config: RedirectorConfig,
    ) -> Self {
        if config.interval < MIN_INTERVAL {
            warn!(requested = ?config.interval, "relay interval too short, using minimum");
            config.interval = MIN_INTERVAL;
        }
        Self {
            outbox,
            sender,
            config,
        }
    }

    /// Relays every `interval` until `shutdown` fires.
    ///
    /// The first pass runs immediately. Shutdown abandons an in-flight pass;
    /// anything it did not mark as sent is relayed again by the next run.
    pub async fn start(&self, shutdown: Shutdown) -> RelayStats {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = RelayStats::default();
        info!(interval = ?self.config.interval, "redirector started");

        loop {
            tokio::select! {
                biased;
                () = shutdown.wait() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                () = shutdown.wait() => break,
                outcome = self.tick() => outcome,
            };

            stats.ticks += 1;
            match outcome {
                Ok(report) => {
                    stats.sent += report.sent;
                    stats.failed += report.failed;
                }
                Err(e) => {
                    stats.pull_errors += 1;
                    error!(error = %e, "failed to pull outbox events");
                }
            }
        }

        info!(?stats, "redirector stopped");
        stats
    }

    /// Runs one relay pass.
    ///
    /// Events are sent one at a time in pull order. A failed send is logged
    /// and left pending; the rest of the batch still goes out. The events
    /// that made it are marked as sent with a single call at the end.
    ///
    /// # Errors
    ///
    /// Returns the outbox error if pulling fails; nothing is sent then.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickReport, DomainError> {
        let events = self.outbox.pull_events().await?;
        if events.is_empty() {
            return Ok(TickReport {
                marked: true,
                ..TickReport::default()
            });
        }

        let pulled = events.len();
        let mut sent = Vec::with_capacity(pulled);
        for event in events {
            match self
                .sender
                .send_events(slice::from_ref(&event.payload))
                .await
            {
                Ok(()) => sent.push(event),
                Err(e) => {
                    warn!(outbox_id = event.id, error = %e, "failed to relay event, will retry");
                }
            }
        }

        let marked = match self.outbox.mark_events_as_sent(&sent).await {
            Ok(()) => true,
            Err(e) => {
                error!(count = sent.len(), error = %e, "failed to mark relayed events as sent");
                false
            }
        };

        let report = TickReport {
            pulled,
            sent: sent.len(),
            failed: pulled - sent.len(),
            marked,
        };
        debug!(?report, "relay pass finished");
        Ok(report)
    }
}
