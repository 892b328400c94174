//! Per-session lifecycle manager.
//!
//! A [`Session`] owns the complete state for one connection to the chat
//! coordinator.  Its responsibilities are:
//! - Driving the finite-state machine (see [`crate::state`]).
//! - Running the connect, user-query and disconnect exchanges through
//!   [`crate::retry`].
//! - Dispatching inbound messages while connected: answering heartbeats,
//!   displaying chat traffic, noticing when the coordinator ends the session.
//! - Tracking the liveness deadline (see [`crate::timer`]).
//!
//! The connect request goes to the rendezvous port.  Everything after
//! acceptance goes to the session port named in the connect reply, which is
//! recorded exactly once.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::ControlFlow;

use thiserror::Error;
use tokio::time::Instant;

use crate::{
    command::{parse_line, Command},
    console::{Console, Notice},
    message::{ConnectReply, Message, Presence, Tag},
    retry::{Disposition, ExchangeError, Inbound, PendingExchange},
    socket::{Socket, TransportError},
    state::{SessionOutcome, SessionState},
    timer::{LivenessTimer, TimerConfig},
};

/// Everything the core needs from the command line.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user: String,
    pub server: Ipv4Addr,
    pub rendezvous_port: u16,
    pub timers: TimerConfig,
}

/// Errors that stop a session outside the protocol's own outcomes.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation not valid in the current state.
    #[error("operation not valid in state {0}")]
    BadState(SessionState),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// `Break` carries the outcome once the session has terminated.
pub type Step = ControlFlow<SessionOutcome>;

/// A single connection to the chat coordinator.
pub struct Session<C> {
    state: SessionState,
    config: ClientConfig,
    /// Assigned by the connect reply; `None` until then.
    session_port: Option<u16>,
    liveness: LivenessTimer,
    socket: Socket,
    console: C,
}

impl<C: Console> Session<C> {
    /// Create a session in the initial [`SessionState::Connecting`] state.
    pub fn new(socket: Socket, config: ClientConfig, console: C) -> Self {
        let liveness = LivenessTimer::start(config.timers.liveness_window());
        Self {
            state: SessionState::Connecting,
            config,
            session_port: None,
            liveness,
            socket,
            console,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_port(&self) -> Option<u16> {
        self.session_port
    }

    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn liveness_deadline(&self) -> Instant {
        self.liveness.deadline()
    }

    pub fn liveness_expired(&self) -> bool {
        self.liveness.is_expired()
    }

    // -----------------------------------------------------------------------
    // Connecting
    // -----------------------------------------------------------------------

    /// Ask the coordinator for a session.
    ///
    /// On acceptance the session is `Connected` and a pong has been sent to
    /// the new session port so the coordinator learns our source port.
    pub async fn connect(&mut self) -> Result<Step, SessionError> {
        self.expect_state(SessionState::Connecting)?;

        let server = self.config.server;
        let rendezvous = SocketAddr::new(IpAddr::V4(server), self.config.rendezvous_port);
        self.console.show(Notice::Status(format!(
            "Connecting as {} to {server}:{}.",
            self.config.user, self.config.rendezvous_port
        )));

        let exchange = PendingExchange::new(
            Message::ConnectRequest {
                user: self.config.user.clone(),
            },
            rendezvous,
            &[Tag::ConnectReply],
            self.config.timers.connect_timeout,
            self.config.timers.max_attempts,
        );
        let console = &mut self.console;
        let result = exchange
            .run(&self.socket, server, |inbound| {
                if let Ok(Message::ServerText { text }) = inbound {
                    console.show(Notice::Server(text.clone()));
                }
                Disposition::Ignore
            })
            .await;

        match result {
            Ok(Ok(Message::ConnectReply(ConnectReply::Accepted { session_port }))) => {
                self.accept(session_port).await?;
                Ok(ControlFlow::Continue(()))
            }
            Ok(Ok(Message::ConnectReply(ConnectReply::Rejected))) => {
                self.status("Connection rejected by server.");
                Ok(ControlFlow::Break(self.terminate(SessionOutcome::ConnectionRejected)))
            }
            Ok(reply) | Err(ExchangeError::Aborted(reply)) => {
                log::warn!("[session] unreadable connect reply: {reply:?}");
                self.status("Connection rejected. The server's answer was unreadable.");
                Ok(ControlFlow::Break(self.terminate(SessionOutcome::ConnectionRejected)))
            }
            Err(ExchangeError::Timeout { attempts }) => {
                log::info!("[session] no connect reply after {attempts} attempt(s)");
                self.status("Connection failed. Server does not answer.");
                Ok(ControlFlow::Break(self.terminate(SessionOutcome::ServerUnreachable)))
            }
            Err(ExchangeError::Transport(e)) => Err(e.into()),
        }
    }

    async fn accept(&mut self, session_port: u16) -> Result<(), SessionError> {
        self.session_port = Some(session_port);
        self.set_state(SessionState::Connected);
        self.liveness.refresh();
        self.status(&format!(
            "Connection accepted. Please use port {session_port} for further communication."
        ));
        let dest = self.session_dest()?;
        self.socket.send_to(&Message::Pong, dest).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Connected
    // -----------------------------------------------------------------------

    /// Process one datagram received while connected.
    pub async fn handle_datagram(
        &mut self,
        inbound: Inbound,
        from: SocketAddr,
    ) -> Result<Step, SessionError> {
        self.expect_state(SessionState::Connected)?;
        if from.ip() != IpAddr::V4(self.config.server) {
            log::debug!("[session] ignoring datagram from stranger {from}");
            return Ok(ControlFlow::Continue(()));
        }
        self.liveness.refresh();

        match inbound {
            Ok(Message::Ping) => {
                let dest = self.session_dest()?;
                self.socket.send_to(&Message::Pong, dest).await?;
            }
            Ok(Message::DisconnectReply) => return Ok(ControlFlow::Break(self.lose_connection())),
            Ok(msg) => match notice_for(&msg) {
                Some(notice) => self.console.show(notice),
                None => log::debug!("[session] ignoring unexpected {}", msg.tag()),
            },
            Err(e) => log::debug!("[session] ignoring malformed datagram: {e}"),
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Act on one line of operator input.
    pub async fn handle_line(&mut self, line: &str) -> Result<Step, SessionError> {
        self.expect_state(SessionState::Connected)?;
        match parse_line(line) {
            None => Ok(ControlFlow::Continue(())),
            Some(Err(e)) => {
                self.console.show(Notice::Warning(e.to_string()));
                Ok(ControlFlow::Continue(()))
            }
            Some(Ok(Command::Chat(body))) => {
                let dest = self.session_dest()?;
                self.socket.send_to(&Message::Chat { body }, dest).await?;
                Ok(ControlFlow::Continue(()))
            }
            Some(Ok(Command::Search(name))) => self.search(&name).await,
            Some(Ok(Command::Disconnect)) => self.disconnect().await.map(ControlFlow::Break),
        }
    }

    /// Ask whether `name` is online.  Never changes state unless the
    /// coordinator ends the session while we wait.
    pub async fn search(&mut self, name: &str) -> Result<Step, SessionError> {
        self.expect_state(SessionState::Connected)?;
        self.status(&format!("Asking for availability of {name}."));

        let exchange = PendingExchange::new(
            Message::UserQuery {
                name: name.to_string(),
            },
            self.session_dest()?,
            &[Tag::UserReply],
            self.config.timers.query_timeout,
            self.config.timers.max_attempts,
        );
        let (console, liveness) = (&mut self.console, &mut self.liveness);
        let result = exchange
            .run(&self.socket, self.config.server, |inbound| {
                side_traffic(console, liveness, inbound, true)
            })
            .await;

        match result {
            Ok(reply) => {
                self.liveness.refresh();
                match reply {
                    Ok(Message::UserReply(Presence::Found { user })) => {
                        self.status(&format!("User {user} is here!"));
                    }
                    Ok(Message::UserReply(Presence::NotFound)) => {
                        self.status(&format!("User {name} was not found on this server."));
                    }
                    other => {
                        log::warn!("[session] unreadable user reply: {other:?}");
                        self.console.show(Notice::Warning(format!(
                            "Unreadable answer to the query for {name}."
                        )));
                    }
                }
                Ok(ControlFlow::Continue(()))
            }
            Err(ExchangeError::Timeout { .. }) => {
                self.status(&format!("No answer to the query for {name}."));
                Ok(ControlFlow::Continue(()))
            }
            Err(ExchangeError::Aborted(_)) => Ok(ControlFlow::Break(self.lose_connection())),
            Err(ExchangeError::Transport(e)) => Err(e.into()),
        }
    }

    /// Declare the session lost because the liveness deadline passed.
    pub fn expire(&mut self) -> SessionOutcome {
        log::info!(
            "[session] no traffic for {:?}; giving up",
            self.liveness.window()
        );
        self.lose_connection()
    }

    // -----------------------------------------------------------------------
    // Disconnecting
    // -----------------------------------------------------------------------

    /// Tell the coordinator we are leaving.  Always ends `Terminated`.
    pub async fn disconnect(&mut self) -> Result<SessionOutcome, SessionError> {
        self.expect_state(SessionState::Connected)?;
        self.set_state(SessionState::Disconnecting);
        self.status(&format!("Disconnecting from {}.", self.config.server));

        let exchange = PendingExchange::new(
            Message::DisconnectRequest,
            self.session_dest()?,
            &[Tag::DisconnectReply],
            self.config.timers.disconnect_timeout,
            self.config.timers.max_attempts,
        );
        let (console, liveness) = (&mut self.console, &mut self.liveness);
        let result = exchange
            .run(&self.socket, self.config.server, |inbound| {
                side_traffic(console, liveness, inbound, false)
            })
            .await;

        let outcome = match result {
            Ok(_) => {
                self.status("Connection was terminated successfully.");
                SessionOutcome::DisconnectedCleanly
            }
            Err(ExchangeError::Timeout { .. } | ExchangeError::Aborted(_)) => {
                self.status("Could not tear down the connection. Timeout.");
                SessionOutcome::DisconnectIncomplete
            }
            Err(ExchangeError::Transport(e)) => {
                self.set_state(SessionState::Terminated);
                return Err(e.into());
            }
        };
        Ok(self.terminate(outcome))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn session_dest(&self) -> Result<SocketAddr, SessionError> {
        self.session_port
            .map(|port| SocketAddr::new(IpAddr::V4(self.config.server), port))
            .ok_or(SessionError::BadState(self.state))
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::BadState(self.state))
        }
    }

    fn set_state(&mut self, next: SessionState) {
        log::debug!("[session] {} → {}", self.state, next);
        self.state = next;
    }

    fn terminate(&mut self, outcome: SessionOutcome) -> SessionOutcome {
        self.set_state(SessionState::Terminated);
        log::info!("[session] terminated: {outcome:?}");
        outcome
    }

    fn lose_connection(&mut self) -> SessionOutcome {
        self.status("Lost connection to the server. Timeout.");
        self.terminate(SessionOutcome::ConnectionLost)
    }

    fn status(&mut self, text: &str) {
        self.console.show(Notice::Status(text.to_string()));
    }
}

/// Display line for the display-only message kinds.
fn notice_for(msg: &Message) -> Option<Notice> {
    match msg {
        Message::UserJoined { user } => Some(Notice::Chat(format!("Hi, my name is <{user}>!"))),
        Message::UserLeft { user } => Some(Notice::Chat(format!("<{user}> left the chat."))),
        Message::RelayedChat { user, body } => Some(Notice::Chat(format!("<{user}>: {body}"))),
        Message::ServerText { text } => Some(Notice::Server(text.clone())),
        _ => None,
    }
}

/// Traffic that arrives while a connected-state exchange is outstanding.
///
/// Heartbeats are answered at once and display-only messages are shown, so
/// an exchange does not cost the operator any chat lines.
fn side_traffic<C: Console>(
    console: &mut C,
    liveness: &mut LivenessTimer,
    inbound: &Inbound,
    abort_on_close: bool,
) -> Disposition {
    liveness.refresh();
    match inbound {
        Ok(Message::Ping) => Disposition::Reply(Message::Pong),
        Ok(Message::DisconnectReply) if abort_on_close => Disposition::Abort,
        Ok(msg) => {
            match notice_for(msg) {
                Some(notice) => console.show(notice),
                None => log::debug!("[session] ignoring unexpected {}", msg.tag()),
            }
            Disposition::Ignore
        }
        Err(e) => {
            log::debug!("[session] ignoring malformed datagram: {e}");
            Disposition::Ignore
        }
    }
}
