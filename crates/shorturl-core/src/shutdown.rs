//! Cooperative shutdown signal for long-running loops.

use tokio::sync::watch;

/// Creates a linked trigger/signal pair.
#[must_use]
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Owning side of the signal. Dropping it counts as triggering.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Signals every linked [`Shutdown`].
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Returns another signal linked to this trigger.
    #[must_use]
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// Cloneable, awaitable view of a [`ShutdownTrigger`].
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Completes when shutdown is requested or the trigger is dropped.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // An error means the trigger is gone, which is also a shutdown.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_wait_completes_after_trigger() {
        // Arrange
        let (trigger, shutdown) = channel();
        let waiter = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { shutdown.wait().await }
        });

        // Act
        trigger.trigger();

        // Assert
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_untriggered_signal_keeps_waiting() {
        let (_trigger, shutdown) = channel();

        let result = tokio::time::timeout(Duration::from_millis(20), shutdown.wait()).await;

        assert!(result.is_err());
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_dropping_trigger_counts_as_shutdown() {
        let (trigger, shutdown) = channel();

        drop(trigger);

        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_subscribe_links_new_signal() {
        let (trigger, _shutdown) = channel();
        let late = trigger.subscribe();

        trigger.trigger();

        assert!(late.is_triggered());
    }
}
