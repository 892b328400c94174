//! Integration tests for a full session driven by the event loop.
//!
//! The client runs in the test task; the fake coordinator runs as a spawned
//! task and feeds operator input through the same channel stdin would use.

mod common;

use std::future::pending;
use std::time::Duration;

use common::{config, drain, ephemeral, Coordinator};
use tokio::sync::{mpsc, oneshot};
use udp_chat::{
    console::Notice,
    event_loop,
    message::{Message, Presence},
    Session, SessionOutcome, SessionState,
};

/// Run a client session to completion against `coord`'s ports.
///
/// `script` plays the coordinator; it gets the coordinator and the input
/// sender and returns the coordinator when done.
async fn run_session<F, Fut>(coord: Coordinator, script: F) -> (SessionOutcome, Vec<Notice>, Coordinator)
where
    F: FnOnce(Coordinator, mpsc::Sender<String>) -> Fut,
    Fut: std::future::Future<Output = Coordinator> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    let mut session = Session::new(
        ephemeral().await,
        config("alice", coord.rendezvous_port()),
        Vec::new(),
    );
    let server = tokio::spawn(script(coord, tx));

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        event_loop::run(&mut session, rx, pending()),
    )
    .await
    .expect("session hung")
    .expect("session failed");

    assert_eq!(session.state(), SessionState::Terminated);
    let coord = server.await.expect("coordinator script panicked");
    (outcome, session.console().clone(), coord)
}

fn chat_lines(notices: &[Notice]) -> Vec<&Notice> {
    notices.iter().filter(|n| matches!(n, Notice::Chat(_))).collect()
}

#[tokio::test]
async fn clean_disconnect() {
    let (outcome, notices, coord) = run_session(Coordinator::start().await, |coord, input| async move {
        let client = coord.accept().await;
        input.send("/disconnect".into()).await.unwrap();
        coord.confirm_disconnect(client).await;
        coord
    })
    .await;

    assert_eq!(outcome, SessionOutcome::DisconnectedCleanly);
    assert!(notices.contains(&Notice::Status("Connection was terminated successfully.".into())));
    // Nothing after acceptance went to the rendezvous port.
    assert!(drain(&coord.rendezvous, Duration::from_millis(100)).await.is_empty());
}

#[tokio::test]
async fn heartbeat_gets_exactly_one_pong() {
    let (outcome, notices, _) = run_session(Coordinator::start().await, |coord, input| async move {
        let client = coord.accept().await;
        coord.send(Message::Ping, client).await;
        assert_eq!(coord.next().await, Message::Pong);
        assert!(drain(&coord.session, Duration::from_millis(100)).await.is_empty());

        input.send("/disconnect".into()).await.unwrap();
        coord.confirm_disconnect(client).await;
        coord
    })
    .await;

    assert_eq!(outcome, SessionOutcome::DisconnectedCleanly);
    assert!(chat_lines(&notices).is_empty());
}

#[tokio::test]
async fn heartbeats_keep_the_session_alive() {
    let (outcome, _, _) = run_session(Coordinator::start().await, |coord, input| async move {
        let client = coord.accept().await;
        // 2 s of pings at the heartbeat interval: twice the liveness window.
        for _ in 0..8 {
            tokio::time::sleep(Duration::from_millis(250)).await;
            coord.send(Message::Ping, client).await;
            assert_eq!(coord.next().await, Message::Pong);
        }
        input.send("/disconnect".into()).await.unwrap();
        coord.confirm_disconnect(client).await;
        coord
    })
    .await;

    assert_eq!(outcome, SessionOutcome::DisconnectedCleanly);
}

#[tokio::test]
async fn announcements_and_chat_are_displayed() {
    let (_, notices, _) = run_session(Coordinator::start().await, |coord, input| async move {
        let client = coord.accept().await;
        coord.send(Message::UserJoined { user: "bob".into() }, client).await;
        coord
            .send(Message::RelayedChat { user: "bob".into(), body: "hello".into() }, client)
            .await;
        coord.send(Message::ServerText { text: "be nice".into() }, client).await;
        coord.send(Message::UserLeft { user: "bob".into() }, client).await;
        // Ordering on loopback is preserved; give the client a moment.
        tokio::time::sleep(Duration::from_millis(100)).await;
        input.send("/disconnect".into()).await.unwrap();
        coord.confirm_disconnect(client).await;
        coord
    })
    .await;

    assert_eq!(
        chat_lines(&notices),
        vec![
            &Notice::Chat("Hi, my name is <bob>!".into()),
            &Notice::Chat("<bob>: hello".into()),
            &Notice::Chat("<bob> left the chat.".into()),
        ]
    );
    assert!(notices.contains(&Notice::Server("be nice".into())));
}

#[tokio::test]
async fn silence_loses_the_connection() {
    let started = tokio::time::Instant::now();
    let (outcome, notices, _) = run_session(Coordinator::start().await, |coord, input| async move {
        coord.accept().await;
        // Hold the input open and say nothing.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        drop(input);
        coord
    })
    .await;

    assert_eq!(outcome, SessionOutcome::ConnectionLost);
    assert!(started.elapsed() >= Duration::from_secs(1), "liveness window is 4 × 250 ms");
    assert!(notices.contains(&Notice::Status("Lost connection to the server. Timeout.".into())));
}

#[tokio::test]
async fn unsolicited_disconnect_reply_loses_the_connection() {
    let (outcome, _, coord) = run_session(Coordinator::start().await, |coord, input| async move {
        let client = coord.accept().await;
        coord.send(Message::DisconnectReply, client).await;
        // Keep the input open until the client has gone.
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(input);
        coord
    })
    .await;

    assert_eq!(outcome, SessionOutcome::ConnectionLost);
    // No disconnect request: the coordinator already dropped us.
    assert!(drain(&coord.session, Duration::from_millis(100)).await.is_empty());
}

#[tokio::test]
async fn garbage_and_unknown_tags_are_ignored() {
    let (outcome, notices, _) = run_session(Coordinator::start().await, |coord, input| async move {
        let client = coord.accept().await;
        let raw = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        raw.send_to(&[42, 1, 2, 3], client).await.unwrap();
        raw.send_to(&[12, 0, 9, b'x'], client).await.unwrap();
        raw.send_to(&[], client).await.unwrap();
        // A client-bound tag the client never expects.
        coord.send(Message::Chat { body: "echo".into() }, client).await;

        input.send("/disconnect".into()).await.unwrap();
        coord.confirm_disconnect(client).await;
        coord
    })
    .await;

    assert_eq!(outcome, SessionOutcome::DisconnectedCleanly);
    assert!(chat_lines(&notices).is_empty());
}

#[tokio::test]
async fn chat_lines_go_to_session_port() {
    let (_, notices, _) = run_session(Coordinator::start().await, |coord, input| async move {
        let client = coord.accept().await;
        input.send("hello everyone".into()).await.unwrap();
        assert_eq!(coord.next().await, Message::Chat { body: "hello everyone".into() });

        input.send("x".repeat(1395)).await.unwrap();
        assert_eq!(coord.next().await, Message::Chat { body: "x".repeat(1395) });

        // One byte over: refused locally, never sent.
        input.send("x".repeat(1396)).await.unwrap();
        input.send("".into()).await.unwrap();
        input.send("/disconnect".into()).await.unwrap();
        coord.confirm_disconnect(client).await;
        coord
    })
    .await;

    assert_eq!(
        notices.iter().filter(|n| matches!(n, Notice::Warning(_))).count(),
        1
    );
}

#[tokio::test]
async fn search_reports_found_and_not_found() {
    let (outcome, notices, _) = run_session(Coordinator::start().await, |coord, input| async move {
        let client = coord.accept().await;

        input.send("/search bob".into()).await.unwrap();
        assert_eq!(coord.next().await, Message::UserQuery { name: "bob".into() });
        coord
            .send(Message::UserReply(Presence::Found { user: "bob".into() }), client)
            .await;

        input.send("/search zed".into()).await.unwrap();
        assert_eq!(coord.next().await, Message::UserQuery { name: "zed".into() });
        coord.send(Message::UserReply(Presence::NotFound), client).await;

        input.send("/disconnect".into()).await.unwrap();
        coord.confirm_disconnect(client).await;
        coord
    })
    .await;

    assert_eq!(outcome, SessionOutcome::DisconnectedCleanly);
    assert!(notices.contains(&Notice::Status("User bob is here!".into())));
    assert!(notices.contains(&Notice::Status("User zed was not found on this server.".into())));
}

#[tokio::test]
async fn search_with_invalid_name_is_refused_locally() {
    let (_, notices, _) = run_session(Coordinator::start().await, |coord, input| async move {
        let client = coord.accept().await;
        input.send("/search not-a-name".into()).await.unwrap();
        input.send("/disconnect".into()).await.unwrap();
        // The first thing on the wire is the disconnect request.
        assert_eq!(coord.next().await, Message::DisconnectRequest);
        coord.send(Message::DisconnectReply, client).await;
        coord
    })
    .await;

    assert!(notices.contains(&Notice::Warning("Invalid username was entered.".into())));
}

#[tokio::test]
async fn unanswered_search_is_bounded_and_not_fatal() {
    let (outcome, notices, _) = run_session(Coordinator::start().await, |coord, input| async move {
        let client = coord.accept().await;
        input.send("/search bob".into()).await.unwrap();

        // Never answer; ping on every attempt so liveness holds.
        for _ in 0..3 {
            assert_eq!(coord.next().await, Message::UserQuery { name: "bob".into() });
            coord.send(Message::Ping, client).await;
            assert_eq!(coord.next().await, Message::Pong);
        }

        input.send("/disconnect".into()).await.unwrap();
        coord.confirm_disconnect(client).await;
        coord
    })
    .await;

    assert_eq!(outcome, SessionOutcome::DisconnectedCleanly);
    assert!(notices.contains(&Notice::Status("No answer to the query for bob.".into())));
}

#[tokio::test]
async fn chat_during_search_is_not_lost() {
    let (_, notices, _) = run_session(Coordinator::start().await, |coord, input| async move {
        let client = coord.accept().await;
        input.send("/search bob".into()).await.unwrap();
        assert_eq!(coord.next().await, Message::UserQuery { name: "bob".into() });
        coord
            .send(Message::RelayedChat { user: "carol".into(), body: "hi".into() }, client)
            .await;
        coord.send(Message::UserReply(Presence::NotFound), client).await;

        input.send("/disconnect".into()).await.unwrap();
        coord.confirm_disconnect(client).await;
        coord
    })
    .await;

    assert_eq!(chat_lines(&notices), vec![&Notice::Chat("<carol>: hi".into())]);
}

#[tokio::test]
async fn server_timeout_during_search_loses_the_connection() {
    let (outcome, _, _) = run_session(Coordinator::start().await, |coord, input| async move {
        let client = coord.accept().await;
        input.send("/search bob".into()).await.unwrap();
        assert_eq!(coord.next().await, Message::UserQuery { name: "bob".into() });
        coord.send(Message::DisconnectReply, client).await;
        coord
    })
    .await;

    assert_eq!(outcome, SessionOutcome::ConnectionLost);
}

#[tokio::test]
async fn unconfirmed_disconnect_still_terminates() {
    let (outcome, notices, _) = run_session(Coordinator::start().await, |coord, input| async move {
        coord.accept().await;
        input.send("/disconnect".into()).await.unwrap();
        for _ in 0..3 {
            assert_eq!(coord.next().await, Message::DisconnectRequest);
        }
        assert!(drain(&coord.session, Duration::from_millis(500)).await.is_empty());
        coord
    })
    .await;

    assert_eq!(outcome, SessionOutcome::DisconnectIncomplete);
    assert!(notices.contains(&Notice::Status(
        "Could not tear down the connection. Timeout.".into()
    )));
}

#[tokio::test]
async fn end_of_input_disconnects() {
    let (outcome, _, _) = run_session(Coordinator::start().await, |coord, input| async move {
        let client = coord.accept().await;
        drop(input);
        coord.confirm_disconnect(client).await;
        coord
    })
    .await;

    assert_eq!(outcome, SessionOutcome::DisconnectedCleanly);
}

#[tokio::test]
async fn interrupt_disconnects() {
    let coord = Coordinator::start().await;
    let (_tx, rx) = mpsc::channel::<String>(1);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut session = Session::new(
        ephemeral().await,
        config("alice", coord.rendezvous_port()),
        Vec::new(),
    );

    let server = tokio::spawn(async move {
        let client = coord.accept().await;
        stop_tx.send(()).unwrap();
        coord.confirm_disconnect(client).await;
    });

    let shutdown = async {
        let _ = stop_rx.await;
    };
    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        event_loop::run(&mut session, rx, shutdown),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(outcome, SessionOutcome::DisconnectedCleanly);
    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_server_never_reaches_the_loop() {
    let silent = ephemeral().await;
    let (_tx, rx) = mpsc::channel::<String>(1);
    let mut session = Session::new(
        ephemeral().await,
        config("alice", silent.local_addr.port()),
        Vec::new(),
    );

    let outcome = event_loop::run(&mut session, rx, pending()).await.unwrap();
    assert_eq!(outcome, SessionOutcome::ServerUnreachable);
    assert_eq!(outcome.exit_code(), 2);
}
