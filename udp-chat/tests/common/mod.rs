//! Shared helpers: an in-process fake coordinator on loopback.

#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::time::Instant;
use udp_chat::{
    message::{ConnectReply, Message},
    socket::{Received, Socket},
    timer::TimerConfig,
    ClientConfig,
};

/// Protocol timings shrunk so a full session fits in a test.
pub fn fast_timers() -> TimerConfig {
    TimerConfig {
        connect_timeout: Duration::from_millis(300),
        disconnect_timeout: Duration::from_millis(300),
        query_timeout: Duration::from_millis(300),
        max_attempts: 3,
        heartbeat_interval: Duration::from_millis(250),
        liveness_multiplier: 4,
    }
}

pub fn config(user: &str, rendezvous_port: u16) -> ClientConfig {
    ClientConfig {
        user: user.to_string(),
        server: Ipv4Addr::LOCALHOST,
        rendezvous_port,
        timers: fast_timers(),
    }
}

/// Bind a socket to an OS-assigned port on loopback.
pub async fn ephemeral() -> Socket {
    Socket::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind failed")
}

/// Receive one well-formed message or panic after `within`.
pub async fn expect_message(sock: &Socket, within: Duration) -> (Message, SocketAddr) {
    match sock.recv_until(Instant::now() + within).await.unwrap() {
        Received::Message(msg, from) => (msg, from),
        other => panic!("expected a message, got {other:?}"),
    }
}

/// Everything queued on `sock` until it stays quiet for `quiet`.
pub async fn drain(sock: &Socket, quiet: Duration) -> Vec<Message> {
    let mut out = Vec::new();
    loop {
        match sock.recv_until(Instant::now() + quiet).await.unwrap() {
            Received::Message(msg, _) => out.push(msg),
            Received::Malformed(..) => {}
            Received::Timeout => return out,
        }
    }
}

/// The two ports a coordinator listens on.
pub struct Coordinator {
    pub rendezvous: Socket,
    pub session: Socket,
}

impl Coordinator {
    pub async fn start() -> Self {
        Self {
            rendezvous: ephemeral().await,
            session: ephemeral().await,
        }
    }

    pub fn rendezvous_port(&self) -> u16 {
        self.rendezvous.local_addr.port()
    }

    pub fn session_port(&self) -> u16 {
        self.session.local_addr.port()
    }

    /// Accept one connect request and wait for the opening pong.
    ///
    /// Returns the client's address.
    pub async fn accept(&self) -> SocketAddr {
        let (req, client) = expect_message(&self.rendezvous, Duration::from_secs(2)).await;
        assert!(matches!(req, Message::ConnectRequest { .. }), "{req:?}");

        let reply = Message::ConnectReply(ConnectReply::Accepted {
            session_port: self.session_port(),
        });
        self.rendezvous.send_to(&reply, client).await.unwrap();

        let (pong, from) = expect_message(&self.session, Duration::from_secs(2)).await;
        assert_eq!(pong, Message::Pong);
        assert_eq!(from, client, "pong must come from the client's own port");
        client
    }

    /// Send from the session port.
    pub async fn send(&self, msg: Message, client: SocketAddr) {
        self.session.send_to(&msg, client).await.unwrap();
    }

    /// Next message on the session port.
    pub async fn next(&self) -> Message {
        expect_message(&self.session, Duration::from_secs(2)).await.0
    }

    /// Wait for a disconnect request and confirm it.
    pub async fn confirm_disconnect(&self, client: SocketAddr) {
        loop {
            match self.next().await {
                Message::DisconnectRequest => break,
                Message::Pong => continue,
                other => panic!("expected a disconnect request, got {other:?}"),
            }
        }
        self.send(Message::DisconnectReply, client).await;
    }
}
