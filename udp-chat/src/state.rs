//! Session finite-state machine types.
//!
//! This module defines every state a [`crate::session::Session`] can occupy
//! and the outcome it ends with.  Transitions live in [`crate::session`].
//!
//! ```text
//!  CONNECTING ──accepted──▶ CONNECTED ──/disconnect──▶ DISCONNECTING
//!      │                        │                            │
//!      │ timeout / rejected     │ lost / server timeout      │ confirmed / timeout
//!      ▼                        ▼                            ▼
//!  TERMINATED ◀─────────────────┴────────────────────────────┘
//! ```

use std::fmt;

/// All possible states of the session FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for the coordinator to accept the connect request.
    #[default]
    Connecting,
    /// A session port has been assigned; chat traffic flows.
    Connected,
    /// Disconnect request in flight.
    Disconnecting,
    /// Terminal; no further network activity.
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "CONNECTING",
            SessionState::Connected => "CONNECTED",
            SessionState::Disconnecting => "DISCONNECTING",
            SessionState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The coordinator confirmed the disconnect.
    DisconnectedCleanly,
    /// No disconnect confirmation after every attempt; closed locally anyway.
    DisconnectIncomplete,
    /// Liveness deadline passed, or the coordinator ended the session.
    ConnectionLost,
    /// No connect reply after every attempt.
    ServerUnreachable,
    /// The coordinator refused the connect request, or its reply was unreadable.
    ConnectionRejected,
}

impl SessionOutcome {
    /// Process exit status for this outcome.
    ///
    /// Failures before a session exists share the usage-error status (2) with
    /// argument validation; failures after acceptance are runtime errors (1).
    pub fn exit_code(self) -> u8 {
        match self {
            SessionOutcome::DisconnectedCleanly => 0,
            SessionOutcome::DisconnectIncomplete | SessionOutcome::ConnectionLost => 1,
            SessionOutcome::ServerUnreachable | SessionOutcome::ConnectionRejected => 2,
        }
    }
}
