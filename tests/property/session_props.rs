//! Property tests for session routing, driven through a loopback transport.
//!
//! 1. Whitespace-only identities never open a connection.
//! 2. Messages scoped to another room never grow the log.
//! 3. After any sequence of room switches the log is empty and the last
//!    room is current.
//! 4. An echo is shown iff its room is still current when it arrives.
//! 5. A `room_list` replaces the known rooms verbatim.

use proptest::prelude::*;
use roomchat::connection::ConnectionState;
use roomchat::connection::loopback::{LoopbackConnector, LoopbackPeer};
use roomchat::session::Session;
use roomchat_proto::frame::Frame;

fn connected(name: &str) -> (Session<LoopbackConnector>, LoopbackPeer) {
    let connector = LoopbackConnector::new();
    let (mut session, _feed) = Session::new(connector.clone(), "ws://chat.test");
    assert!(session.set_identity(name));
    let mut peer = connector.take_peer().unwrap();
    peer.open();
    session.drain_events();
    peer.sent();
    (session, peer)
}

proptest! {
    #[test]
    fn blank_identity_never_connects(name in "[ \t\n]{0,8}") {
        let connector = LoopbackConnector::new();
        let (mut session, _feed) = Session::new(connector.clone(), "ws://chat.test");
        prop_assert!(!session.set_identity(&name));
        prop_assert_eq!(connector.connection_count(), 0);
        prop_assert_eq!(session.state(), ConnectionState::Disconnected);
        prop_assert!(session.identity().is_none());
    }

    #[test]
    fn other_room_traffic_is_dropped(
        rooms in prop::collection::vec("[a-z]{1,8}", 1..20),
        text in "[a-z ]{1,40}",
    ) {
        let (mut session, peer) = connected("alice");
        let before = session.log().len();
        for room in &rooms {
            if room == "general" {
                continue;
            }
            peer.push_frame(&Frame::chat("bob", room, &text));
            peer.push_frame(&Frame::System {
                text: text.clone(),
                room: Some(room.clone()),
                user: Some("bob".into()),
            });
        }
        session.drain_events();
        prop_assert_eq!(session.log().len(), before);
    }

    #[test]
    fn room_switches_leave_empty_log(rooms in prop::collection::vec("[a-z]{1,12}", 1..10)) {
        let (mut session, peer) = connected("alice");
        peer.push_frame(&Frame::system("welcome"));
        session.drain_events();

        for room in &rooms {
            prop_assert!(session.join_room(room));
        }

        let last = rooms.last().unwrap();
        prop_assert!(session.log().is_empty());
        prop_assert_eq!(session.current_room(), last.as_str());
        for room in &rooms {
            prop_assert!(session.rooms().contains(room));
        }
    }

    #[test]
    fn echo_shown_iff_room_still_current(
        sent_in in "[a-z]{1,6}",
        now_in in "[a-z]{1,6}",
        text in "[a-z]{1,20}",
    ) {
        let (mut session, mut peer) = connected("alice");
        session.join_room(&sent_in);
        prop_assert!(session.send_message(&text));
        let sent = peer.sent_frames();
        prop_assert_eq!(sent.last(), Some(&Frame::chat("alice", &sent_in, &text)));

        session.join_room(&now_in);
        peer.push_frame(&Frame::chat("alice", &sent_in, &text));
        session.drain_events();

        let shown = session
            .log()
            .entries()
            .iter()
            .any(|e| e.text == text && e.user.as_deref() == Some("alice"));
        prop_assert_eq!(shown, sent_in == now_in);
    }

    #[test]
    fn room_list_is_taken_verbatim(rooms in prop::collection::vec("[a-z]{1,8}", 0..8)) {
        let (mut session, peer) = connected("alice");
        session.join_room("scratch");
        peer.push_frame(&Frame::RoomList { rooms: rooms.clone() });
        session.drain_events();
        prop_assert_eq!(session.rooms(), rooms.as_slice());
        prop_assert_eq!(session.current_room(), "scratch");
    }
}

#[test]
fn general_and_devs_scenario() {
    let (mut session, peer) = connected("Alice");
    peer.push_frame(&Frame::RoomList {
        rooms: vec!["general".into(), "devs".into()],
    });
    peer.push_frame(&Frame::chat("Bob", "devs", "not here"));
    peer.push_frame(&Frame::chat("Bob", "general", "hi Alice"));
    session.drain_events();

    assert_eq!(session.rooms(), ["general", "devs"]);
    let texts: Vec<&str> = session
        .log()
        .entries()
        .iter()
        .map(|e| e.text.as_str())
        .collect();
    assert_eq!(texts, ["connected", "hi Alice"]);
}
