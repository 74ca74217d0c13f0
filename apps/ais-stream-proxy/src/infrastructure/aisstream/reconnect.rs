//! Reconnection Policy
//!
//! Fixed-delay, unbounded retry for the upstream connection.

use std::time::Duration;

/// Default wait between a connection loss and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Wait before every reconnection attempt.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::default_const()
    }
}

impl ReconnectConfig {
    /// Create a configuration with a custom delay. A zero delay falls back
    /// to [`DEFAULT_RECONNECT_DELAY`].
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        if delay.is_zero() {
            Self::default_const()
        } else {
            Self { delay }
        }
    }

    const fn default_const() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Reconnection policy: same delay every time, attempts counted.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Record an attempt and return the delay to wait before it.
    pub const fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.config.delay
    }

    /// Reset the attempt counter after the stream is healthy again.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}
