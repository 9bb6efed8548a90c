//! Linear reconnect backoff.

use std::time::Duration;

/// Reconnect delays: `initial`, then `step` longer per attempt, capped at
/// `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub initial: Duration,
    /// Added per further attempt.
    pub step: Duration,
    /// Upper bound of any delay.
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            step: Duration::from_secs(1),
            max: Duration::from_secs(15),
        }
    }
}

/// Delay sequence for one outage.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Starts a fresh sequence.
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Number of delays handed out so far.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay before the next attempt and advances.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self
            .policy
            .step
            .saturating_mul(self.attempt)
            .saturating_add(self.policy.initial)
            .min(self.policy.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }
}
