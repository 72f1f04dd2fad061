//! Integration tests for the session lifecycle against a live server.
//!
//! Covers the open handshake, chat echo, teardown `leave`, connect
//! failure, plain-text server notices, and server-initiated close.
//!
//! Verification command: `cargo test --test session_flow`

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite;

use roomchat::connection::ConnectionState;
use roomchat::connection::ws::WsConnector;
use roomchat::log::EntryKind;
use roomchat::session::Session;
use roomchat_server::server::{ServerState, start_server_with_state};

// =============================================================================
// Helpers
// =============================================================================

type ChatSession = Session<WsConnector>;

async fn start() -> (String, Arc<ServerState>) {
    let state = Arc::new(ServerState::new());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start test server");
    (format!("ws://{addr}"), state)
}

fn session(url: &str) -> ChatSession {
    Session::new(WsConnector::new(Duration::from_secs(2)), url).0
}

/// Feed transport events into `session` until `cond` holds.
async fn pump_until(session: &mut ChatSession, what: &str, cond: impl Fn(&ChatSession) -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(5), async move {
        while !cond(session) {
            match session.next_event().await {
                Some(event) => session.handle_event(event),
                None => break,
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}

fn has_text(session: &ChatSession, text: &str) -> bool {
    session.log().entries().iter().any(|e| e.text == text)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn open_handshake_and_chat_echo() {
    let (url, _state) = start().await;
    let mut alice = session(&url);
    assert!(alice.set_identity("Alice"));

    pump_until(&mut alice, "room list", |s| !s.rooms().is_empty()).await;
    assert_eq!(alice.state(), ConnectionState::Open);
    assert_eq!(alice.rooms(), ["general"]);
    assert!(has_text(&alice, "connected"));

    pump_until(&mut alice, "room notice", |s| {
        has_text(s, "'Alice' joined room 'general'.")
    })
    .await;

    assert!(alice.send_message("hello"));
    pump_until(&mut alice, "echo", |s| {
        s.log()
            .last()
            .is_some_and(|e| e.kind == EntryKind::Chat && e.text == "hello")
    })
    .await;
    let echoed = alice.log().last().expect("log has the echo");
    assert_eq!(echoed.user.as_deref(), Some("Alice"));
    assert_eq!(echoed.room.as_deref(), Some("general"));
}

#[tokio::test]
async fn ending_the_session_sends_leave() {
    let (url, state) = start().await;
    let mut bob = session(&url);
    bob.set_identity("Bob");
    pump_until(&mut bob, "bob joined", |s| {
        has_text(s, "'Bob' joined room 'general'.")
    })
    .await;

    let mut alice = session(&url);
    alice.set_identity("Alice");
    pump_until(&mut alice, "alice open", |s| s.state().is_open()).await;
    pump_until(&mut bob, "alice arrives", |s| {
        has_text(s, "'Alice' joined the chat.")
    })
    .await;

    alice.end();
    assert!(alice.identity().is_none());
    assert!(alice.wait_closed(Duration::from_secs(3)).await);

    pump_until(&mut bob, "alice leaves", |s| {
        has_text(s, "'Alice' left the chat.")
    })
    .await;
    assert_eq!(state.joined_count().await, 1);
}

#[tokio::test]
async fn unreachable_server_is_reported() {
    let mut alice = session("ws://127.0.0.1:1");
    alice.set_identity("Alice");
    pump_until(&mut alice, "close", |s| s.state().is_closed()).await;

    assert_eq!(
        alice.state(),
        ConnectionState::Closed {
            code: 1006,
            was_clean: false
        }
    );
    let texts: Vec<&str> = alice
        .log()
        .entries()
        .iter()
        .map(|e| e.text.as_str())
        .collect();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].starts_with("connection error: "));
    assert_eq!(texts[1], "connection lost (code 1006)");

    // A fresh session can be started after ending the failed one.
    alice.end();
    assert!(alice.set_identity("Alice"));
}

#[tokio::test]
async fn plain_text_from_server_becomes_notice() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(tungstenite::Message::Text("server restarting".into()))
            .await
            .unwrap();
        while ws.next().await.is_some() {}
    });

    let mut alice = session(&format!("ws://{addr}"));
    alice.set_identity("Alice");
    pump_until(&mut alice, "notice", |s| has_text(s, "server restarting")).await;

    let notice = alice.log().last().unwrap();
    assert_eq!(notice.kind, EntryKind::System);
    assert!(notice.room.is_none());
}

#[tokio::test]
async fn server_close_is_reported_as_clean() {
    let (url, state) = start().await;
    let mut alice = session(&url);
    alice.set_identity("Alice");
    pump_until(&mut alice, "joined", |s| {
        has_text(s, "'Alice' joined room 'general'.")
    })
    .await;

    state.close_all_connections().await;
    pump_until(&mut alice, "close", |s| s.state().is_closed()).await;

    assert_eq!(
        alice.state(),
        ConnectionState::Closed {
            code: 1005,
            was_clean: true
        }
    );
    assert!(has_text(&alice, "disconnected cleanly (code 1005)"));
    assert!(!alice.send_message("anyone?"));
}
