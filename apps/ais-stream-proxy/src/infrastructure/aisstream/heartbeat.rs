//! Upstream Liveness
//!
//! A half-open upstream connection looks exactly like a quiet feed. The
//! client pings on a fixed interval and treats any inbound frame as proof of
//! life; if a ping goes unanswered for longer than the timeout the
//! connection is considered lost.

use std::time::{Duration, Instant};

/// Default interval between pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default silence tolerated after a ping.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Silence after a ping before the connection is considered dead.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }
}

/// What the connection loop should do on a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a ping.
    SendPing,
    /// No frame since the last ping within the timeout.
    TimedOut(Duration),
}

/// Per-connection liveness tracker.
///
/// Owned by a single connection loop, so no interior mutability.
#[derive(Debug)]
pub struct Heartbeat {
    config: HeartbeatConfig,
    last_activity: Instant,
    waiting_for_pong: bool,
}

impl Heartbeat {
    /// Start tracking a freshly opened connection.
    #[must_use]
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            last_activity: Instant::now(),
            waiting_for_pong: false,
        }
    }

    /// The tick interval for the connection loop. Never zero.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        if self.config.ping_interval.is_zero() {
            DEFAULT_PING_INTERVAL
        } else {
            self.config.ping_interval
        }
    }

    /// Record any inbound frame.
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
        self.waiting_for_pong = false;
    }

    /// Decide what to do on a tick.
    pub fn on_tick(&mut self) -> HeartbeatAction {
        self.on_tick_at(Instant::now())
    }

    fn on_tick_at(&mut self, now: Instant) -> HeartbeatAction {
        let silent_for = now.saturating_duration_since(self.last_activity);
        if self.waiting_for_pong && silent_for > self.config.pong_timeout {
            return HeartbeatAction::TimedOut(silent_for);
        }
        self.waiting_for_pong = true;
        HeartbeatAction::SendPing
    }
}
