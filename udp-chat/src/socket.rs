//! UDP transport for chat messages.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! [`crate::message::Message`] instead of raw bytes.  All protocol logic lives
//! elsewhere; this module owns only byte I/O.
//!
//! Receives report one of three explicit outcomes (see [`Received`]) so
//! callers branch on variants instead of on errors: a decoded message, a
//! datagram that failed to decode, or an elapsed deadline.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::message::{CodecError, Message, MAX_DATAGRAM};

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// An outbound message could not be encoded.
    #[error("cannot encode outbound message: {0}")]
    Encode(#[from] CodecError),
}

/// What one bounded receive produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Message(Message, SocketAddr),
    /// A datagram arrived but is not a well-formed message.
    Malformed(CodecError, SocketAddr),
    /// The deadline passed with no datagram.
    Timeout,
}

/// A message-oriented UDP socket bound to an ephemeral local port.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing port 0 lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Bind to an OS-chosen port on every local IPv4 interface.
    pub async fn bind_ephemeral() -> Result<Self, TransportError> {
        Self::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into()).await
    }

    /// Encode `msg` and send it as a single datagram to `dest`.
    ///
    /// Best effort: success means the OS accepted the datagram, not that it
    /// was delivered.
    pub async fn send_to(&self, msg: &Message, dest: SocketAddr) -> Result<(), TransportError> {
        let bytes = msg.encode()?;
        self.inner.send_to(&bytes, dest).await?;
        log::debug!("[socket] → {} to {dest} ({} bytes)", msg.tag(), bytes.len());
        Ok(())
    }

    /// Receive the next datagram and try to decode it.
    ///
    /// Datagrams longer than [`MAX_DATAGRAM`] are truncated by the OS before
    /// decoding.  Transient errors (e.g. an ICMP "port unreachable" surfacing
    /// as `ConnectionRefused`) are logged and the receive continues.
    pub async fn recv_from(&self) -> Result<(Result<Message, CodecError>, SocketAddr), TransportError> {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            match self.inner.recv_from(&mut buf).await {
                Ok((n, addr)) => {
                    let decoded = Message::decode(&buf[..n]);
                    match &decoded {
                        Ok(msg) => log::debug!("[socket] ← {} from {addr} ({n} bytes)", msg.tag()),
                        Err(e) => log::debug!("[socket] ← malformed datagram from {addr}: {e}"),
                    }
                    return Ok((decoded, addr));
                }
                Err(e) if is_transient_io_error(&e) => {
                    log::debug!("[socket] transient receive error: {e}");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Receive the next datagram, giving up at `deadline`.
    pub async fn recv_until(&self, deadline: Instant) -> Result<Received, TransportError> {
        match tokio::time::timeout_at(deadline, self.recv_from()).await {
            Ok(Ok((Ok(msg), addr))) => Ok(Received::Message(msg, addr)),
            Ok(Ok((Err(e), addr))) => Ok(Received::Malformed(e, addr)),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Ok(Received::Timeout),
        }
    }
}

/// Returns true if the error is likely transient (the next receive may succeed).
fn is_transient_io_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
    )
}
