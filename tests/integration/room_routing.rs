//! Integration tests for room-scoped routing between two live sessions.
//!
//! Verification command: `cargo test --test room_routing`

use std::time::Duration;

use roomchat::connection::ws::WsConnector;
use roomchat::log::EntryKind;
use roomchat::session::Session;
use roomchat_server::server::start_server;

type ChatSession = Session<WsConnector>;

async fn connected(url: &str, name: &str) -> ChatSession {
    let (mut session, _feed) = Session::new(WsConnector::default(), url);
    assert!(session.set_identity(name));
    let notice = format!("'{name}' joined room 'general'.");
    pump_until(&mut session, "join", |s| has_text(s, &notice)).await;
    session
}

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

fn chat_lines(session: &ChatSession) -> Vec<String> {
    session
        .log()
        .entries()
        .iter()
        .filter(|e| e.kind == EntryKind::Chat)
        .map(|e| e.text.clone())
        .collect()
}

#[tokio::test]
async fn messages_stay_in_their_room() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{addr}");

    let mut alice = connected(&url, "Alice").await;
    let mut bob = connected(&url, "Bob").await;

    assert!(alice.join_room("devs"));
    assert!(alice.log().is_empty());
    assert_eq!(alice.current_room(), "devs");
    pump_until(&mut alice, "devs notice", |s| {
        has_text(s, "'Alice' joined room 'devs'.")
    })
    .await;

    assert!(alice.send_message("secret"));
    pump_until(&mut alice, "secret echo", |s| {
        chat_lines(s).contains(&"secret".to_string())
    })
    .await;

    // Bob's writer is FIFO: once his own marker is back, anything routed to
    // him earlier has arrived too.
    assert!(bob.send_message("marker"));
    pump_until(&mut bob, "marker echo", |s| {
        chat_lines(s).contains(&"marker".to_string())
    })
    .await;

    assert_eq!(chat_lines(&bob), vec!["marker"]);
    assert_eq!(chat_lines(&alice), vec!["secret"]);
    assert!(has_text(&bob, "'Alice' left room 'general'."));
}

#[tokio::test]
async fn created_rooms_show_up_for_later_sessions() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{addr}");

    let mut alice = connected(&url, "Alice").await;
    assert!(alice.create_room("  ops "));
    pump_until(&mut alice, "ops notice", |s| {
        has_text(s, "'Alice' joined room 'ops'.")
    })
    .await;

    let mut carol = connected(&url, "Carol").await;
    pump_until(&mut carol, "room list", |s| s.rooms().len() == 2).await;
    assert_eq!(carol.rooms(), ["general", "ops"]);
    assert_eq!(carol.current_room(), "general");
}

#[tokio::test]
async fn switching_back_clears_the_log() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{addr}");

    let mut alice = connected(&url, "Alice").await;
    alice.join_room("devs");
    pump_until(&mut alice, "devs notice", |s| {
        has_text(s, "'Alice' joined room 'devs'.")
    })
    .await;
    alice.join_room("general");
    assert!(alice.log().is_empty());
    pump_until(&mut alice, "general notice", |s| {
        has_text(s, "'Alice' joined room 'general'.")
    })
    .await;
    assert!(!has_text(&alice, "'Alice' joined room 'devs'."));
}
