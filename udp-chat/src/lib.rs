//! `udp-chat` — terminal client for a text-chat protocol carried over UDP.
//!
//! # Architecture
//!
//! ```text
//!  stdin lines ─┐
//!  Ctrl-C ──────┼──▶ event_loop ──▶ Session ──▶ retry ──▶ Socket ──▶ coordinator
//!  datagrams ───┘                     │
//!                                     └──▶ Console ([STATUS]/[CHAT]/[SERVER]/[WARNING])
//! ```
//!
//! Each module has a single responsibility:
//! - [`message`]     — wire format (serialise / deserialise)
//! - [`socket`]      — async UDP socket abstraction
//! - [`retry`]       — bounded request/reply exchanges
//! - [`session`]     — connection lifecycle and message dispatch
//! - [`state`]       — finite-state-machine and outcome types
//! - [`timer`]       — timing configuration and liveness deadline
//! - [`event_loop`]  — multiplexes input, signals and datagrams
//! - [`command`]     — parsing of operator input lines
//! - [`console`]     — operator-visible output
//! - [`username`]    — username syntax rule

pub mod command;
pub mod console;
pub mod event_loop;
pub mod message;
pub mod retry;
pub mod session;
pub mod socket;
pub mod state;
pub mod timer;
pub mod username;

pub use session::{ClientConfig, Session, SessionError};
pub use state::{SessionOutcome, SessionState};
