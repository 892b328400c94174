//! Exchange timeouts and the session liveness deadline.
//!
//! The client never runs a timer task of its own.  Every timeout here is
//! enforced by bounding the next blocking receive:
//! - each request/reply exchange waits at most one per-kind timeout per
//!   attempt, for a fixed number of attempts;
//! - while connected, the event loop never waits past the
//!   [`LivenessTimer`] deadline, which moves forward on every datagram from
//!   the coordinator.
//!
//! The coordinator probes every [`TimerConfig::heartbeat_interval`] and gives
//! up on a client after [`TimerConfig::liveness_multiplier`] missed intervals,
//! so the client applies the same bound in the other direction.

use std::time::Duration;

use tokio::time::Instant;

/// Adjustable timing parameters.
///
/// The defaults are the protocol's values; tests shorten them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    /// Per-attempt wait for a connect reply.
    pub connect_timeout: Duration,
    /// Per-attempt wait for a disconnect reply.
    pub disconnect_timeout: Duration,
    /// Per-attempt wait for a user reply.
    pub query_timeout: Duration,
    /// Total sends per exchange before it fails.
    pub max_attempts: u32,
    /// Interval between the coordinator's heartbeat probes.
    pub heartbeat_interval: Duration,
    /// Missed heartbeat intervals tolerated before the session is lost.
    pub liveness_multiplier: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(4),
            disconnect_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(4),
            max_attempts: 3,
            heartbeat_interval: Duration::from_secs(3),
            liveness_multiplier: 4,
        }
    }
}

impl TimerConfig {
    /// Silence after which a connected session is declared lost.
    pub fn liveness_window(&self) -> Duration {
        self.heartbeat_interval * self.liveness_multiplier
    }
}

/// Deadline after which, with no inbound traffic, the session is lost.
#[derive(Debug, Clone)]
pub struct LivenessTimer {
    window: Duration,
    deadline: Instant,
}

impl LivenessTimer {
    /// Start a timer whose first deadline is one window from now.
    pub fn start(window: Duration) -> Self {
        Self {
            window,
            deadline: Instant::now() + window,
        }
    }

    /// Push the deadline to one full window from now.
    pub fn refresh(&mut self) {
        self.deadline = Instant::now() + self.window;
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
