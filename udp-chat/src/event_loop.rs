//! Single-threaded event loop.
//!
//! # Architecture
//!
//! ```text
//!  stdin ──reader thread──▶ mpsc<String> ─┐
//!                                         │  tokio::select!
//!  UdpSocket (bounded by liveness) ───────┼──────────────────▶ Session
//!                                         │
//!  Ctrl-C ────────────────────────────────┘
//! ```
//!
//! The loop blocks until one source is ready, handles that one event, and
//! blocks again.  There is no polling interval: the only wake-up without
//! input is the liveness deadline, which bounds the socket receive.
//! Exchanges started by an event (search, disconnect) run to completion
//! before the loop waits again.

use std::future::Future;
use std::io::BufRead;
use std::net::SocketAddr;
use std::ops::ControlFlow;

use tokio::sync::mpsc;

use crate::{
    console::Console,
    retry::Inbound,
    session::{Session, SessionError, Step},
    socket::Received,
    state::{SessionOutcome, SessionState},
};

/// Lines buffered between the reader thread and the loop.
const INPUT_BACKLOG: usize = 64;

/// One thing the loop woke up for.
#[derive(Debug)]
pub enum Event {
    Datagram(Inbound, SocketAddr),
    Line(String),
    /// Local input reached end-of-file.
    InputClosed,
    /// The operator pressed Ctrl-C.
    Interrupt,
    /// No traffic from the coordinator before the liveness deadline.
    LivenessExpired,
}

/// Connect, then serve events until the session terminates.
///
/// End of input and `shutdown` both lead to an orderly disconnect.
/// `shutdown` is not polled until the session is connected.
pub async fn run<C, S>(
    session: &mut Session<C>,
    mut input: mpsc::Receiver<String>,
    shutdown: S,
) -> Result<SessionOutcome, SessionError>
where
    C: Console,
    S: Future<Output = ()>,
{
    if let ControlFlow::Break(outcome) = session.connect().await? {
        return Ok(outcome);
    }

    tokio::pin!(shutdown);
    loop {
        // Checked every iteration, not only when a datagram arrives.
        if session.liveness_expired() {
            return Ok(session.expire());
        }

        let deadline = session.liveness_deadline();
        let event = tokio::select! {
            received = session.socket().recv_until(deadline) => match received? {
                Received::Message(msg, from) => Event::Datagram(Ok(msg), from),
                Received::Malformed(e, from) => Event::Datagram(Err(e), from),
                Received::Timeout => Event::LivenessExpired,
            },
            line = input.recv() => match line {
                Some(line) => Event::Line(line),
                None => Event::InputClosed,
            },
            () = &mut shutdown => Event::Interrupt,
        };

        if let ControlFlow::Break(outcome) = dispatch(session, event).await? {
            return Ok(outcome);
        }
    }
}

/// Hand one event to the session.
pub async fn dispatch<C: Console>(
    session: &mut Session<C>,
    event: Event,
) -> Result<Step, SessionError> {
    log::trace!("[loop] {event:?} in {}", session.state());
    if session.state() != SessionState::Connected {
        return Err(SessionError::BadState(session.state()));
    }
    match event {
        Event::Datagram(inbound, from) => session.handle_datagram(inbound, from).await,
        Event::Line(line) => session.handle_line(&line).await,
        Event::InputClosed => {
            log::info!("[loop] input closed; disconnecting");
            session.disconnect().await.map(ControlFlow::Break)
        }
        Event::Interrupt => {
            log::info!("[loop] interrupted; disconnecting");
            session.disconnect().await.map(ControlFlow::Break)
        }
        Event::LivenessExpired => Ok(ControlFlow::Break(session.expire())),
    }
}

/// Read stdin on a dedicated thread, one line per message.
///
/// The channel closes when stdin reaches end-of-file or fails.  The thread
/// is never joined; it ends with the process.
pub fn spawn_stdin_reader() -> std::io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(INPUT_BACKLOG);
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::warn!("[loop] cannot read input: {e}");
                        break;
                    }
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Resolves on the first Ctrl-C; never resolves if the handler cannot be installed.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("[loop] cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
