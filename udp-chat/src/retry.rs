//! Bounded request/reply exchanges.
//!
//! Every client-initiated exchange (connect, disconnect, user query) follows
//! the same contract:
//! - send the request and wait up to one timeout for a reply from the
//!   coordinator's address;
//! - a datagram whose tag is in the expected set ends the exchange at once,
//!   even when it fails to decode (the call site decides what a mangled reply
//!   means);
//! - any other datagram is handed to the call site, which may ignore it,
//!   answer it, or abort the exchange.  It does not extend the deadline;
//! - on timeout, resend the same request, up to a fixed number of attempts,
//!   then fail with [`ExchangeError::Timeout`].
//!
//! An exchange blocks its caller for up to `attempts × timeout`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::message::{CodecError, Message, Tag};
use crate::socket::{Received, Socket, TransportError};

/// A datagram as the call site sees it: decoded, or why it could not be.
pub type Inbound = Result<Message, CodecError>;

/// What the call site wants done with a datagram that is not the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Drop it and keep waiting.
    Ignore,
    /// Send this message to the exchange's destination, then keep waiting.
    Reply(Message),
    /// Stop the exchange; the session cannot continue.
    Abort,
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Every attempt timed out (`ExchangeTimeout`).
    #[error("no reply after {attempts} attempt(s)")]
    Timeout { attempts: u32 },
    /// The call site aborted on this datagram.
    #[error("exchange aborted by the coordinator")]
    Aborted(Inbound),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// State of one request/reply cycle, discarded when the cycle ends.
#[derive(Debug, Clone)]
pub struct PendingExchange {
    request: Message,
    dest: SocketAddr,
    expected: &'static [Tag],
    timeout: Duration,
    attempts_left: u32,
    attempts_made: u32,
}

impl PendingExchange {
    pub fn new(
        request: Message,
        dest: SocketAddr,
        expected: &'static [Tag],
        timeout: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            request,
            dest,
            expected,
            timeout,
            attempts_left: max_attempts,
            attempts_made: 0,
        }
    }

    /// `true` when `inbound` is (or was meant to be) one of the expected replies.
    pub fn is_reply(&self, inbound: &Inbound) -> bool {
        let tag = match inbound {
            Ok(msg) => Some(msg.tag()),
            Err(e) => e.tag(),
        };
        tag.is_some_and(|t| self.expected.contains(&t))
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    fn begin_attempt(&mut self) -> bool {
        if self.attempts_left == 0 {
            return false;
        }
        self.attempts_left -= 1;
        self.attempts_made += 1;
        true
    }

    /// Drive the exchange to completion over `socket`.
    ///
    /// Only datagrams whose source IP is `peer` are considered.
    /// `on_other` is called for every considered datagram that is not a reply.
    pub async fn run<F>(
        mut self,
        socket: &Socket,
        peer: Ipv4Addr,
        mut on_other: F,
    ) -> Result<Inbound, ExchangeError>
    where
        F: FnMut(&Inbound) -> Disposition,
    {
        while self.begin_attempt() {
            socket.send_to(&self.request, self.dest).await?;
            log::debug!(
                "[retry] → {} attempt {}/{}",
                self.request.tag(),
                self.attempts_made,
                self.attempts_made + self.attempts_left
            );

            let deadline = Instant::now() + self.timeout;
            loop {
                let (inbound, from) = match socket.recv_until(deadline).await? {
                    Received::Timeout => break,
                    Received::Message(msg, from) => (Ok(msg), from),
                    Received::Malformed(e, from) => (Err(e), from),
                };
                if from.ip() != IpAddr::V4(peer) {
                    log::debug!("[retry] ignoring datagram from stranger {from}");
                    continue;
                }
                if self.is_reply(&inbound) {
                    return Ok(inbound);
                }
                match on_other(&inbound) {
                    Disposition::Ignore => {}
                    Disposition::Reply(msg) => socket.send_to(&msg, self.dest).await?,
                    Disposition::Abort => return Err(ExchangeError::Aborted(inbound)),
                }
            }

            log::debug!(
                "[retry] {} timed out after {:?}",
                self.request.tag(),
                self.timeout
            );
        }

        Err(ExchangeError::Timeout {
            attempts: self.attempts_made,
        })
    }
}
