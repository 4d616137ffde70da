//! Bounded-retry supervision for Runtime/Recoverable process failures
//! (spec §7): by default a process error is fatal for the whole network,
//! but a caller may opt a node into restart-with-backoff instead.
//!
//! Mirrors the exponential-backoff shape the reference codebase uses for
//! socket reconnection (`ReconnectState`), applied here to process restarts
//! rather than TCP connects.

use std::time::Duration;

/// A node's restart policy. The default, `None`, makes any Error/Fatal
/// process failure terminate the whole network (spec §7's default).
#[derive(Debug, Clone)]
pub enum RestartPolicy {
    /// No restart: the first Error/Fatal failure is terminal for the flow.
    Never,
    /// Restart up to `max_restarts` times, using the same configuration,
    /// waiting an exponentially increasing delay between attempts.
    BoundedRetry {
        max_restarts: u32,
        base_delay: Duration,
        max_delay: Duration,
    },
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::Never
    }
}

impl RestartPolicy {
    #[must_use]
    pub const fn bounded(max_restarts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self::BoundedRetry { max_restarts, base_delay, max_delay }
    }
}

/// Tracks restart attempts and the backoff delay for one supervised node.
#[derive(Debug, Clone)]
pub struct RestartState {
    policy: RestartPolicy,
    attempt: u32,
    current_delay: Duration,
}

impl RestartState {
    #[must_use]
    pub fn new(policy: RestartPolicy) -> Self {
        let current_delay = match &policy {
            RestartPolicy::Never => Duration::ZERO,
            RestartPolicy::BoundedRetry { base_delay, .. } => *base_delay,
        };
        Self { policy, attempt: 0, current_delay }
    }

    /// Whether another restart attempt is permitted.
    #[must_use]
    pub const fn can_restart(&self) -> bool {
        match &self.policy {
            RestartPolicy::Never => false,
            RestartPolicy::BoundedRetry { max_restarts, .. } => self.attempt < *max_restarts,
        }
    }

    /// Consume one restart attempt, returning the delay to wait before it.
    /// Panics if `can_restart()` was false; callers must check first.
    pub fn next_delay(&mut self) -> Duration {
        assert!(self.can_restart(), "restart attempted past policy limit");
        let delay = self.current_delay;
        self.attempt += 1;
        if let RestartPolicy::BoundedRetry { base_delay, max_delay, .. } = &self.policy {
            let scaled = base_delay.saturating_mul(1 << self.attempt.min(10));
            self.current_delay = scaled.min(*max_delay);
        }
        delay
    }

    /// Reset the attempt counter after a sustained successful run.
    pub fn reset(&mut self) {
        self.attempt = 0;
        if let RestartPolicy::BoundedRetry { base_delay, .. } = &self.policy {
            self.current_delay = *base_delay;
        }
    }

    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}
