//! Property tests for inbound decoding.
//!
//! 1. Arbitrary payloads never panic and always yield a frame.
//! 2. Payloads that are not JSON are kept verbatim as system notices.
//! 3. Chat frames keep their room scope through encode → inbound decode.

use proptest::prelude::*;
use roomchat_proto::codec::{self, Origin};
use roomchat_proto::frame::Frame;

proptest! {
    #[test]
    fn arbitrary_text_always_decodes(payload in ".*") {
        let inbound = codec::decode_inbound(&payload);
        if inbound.origin == Origin::PlainText {
            prop_assert_eq!(inbound.frame, Frame::system(payload));
        }
    }

    #[test]
    fn non_json_is_verbatim_system_notice(payload in "[a-zA-Z][a-zA-Z ,.!']{0,80}") {
        let inbound = codec::decode_inbound(&payload);
        prop_assert_eq!(inbound.origin, Origin::PlainText);
        prop_assert_eq!(inbound.frame, Frame::system(payload));
    }

    #[test]
    fn chat_room_scope_survives_the_wire(
        user in "[a-zA-Z0-9_]{1,16}",
        room in "[a-z0-9-]{1,16}",
        text in "[^\u{0}]{1,200}",
    ) {
        let json = codec::encode(&Frame::chat(&user, &room, &text)).unwrap();
        let inbound = codec::decode_inbound(&json);
        prop_assert_eq!(inbound.origin, Origin::Structured);
        prop_assert_eq!(inbound.frame.room(), Some(room.as_str()));
        prop_assert_eq!(inbound.frame.user(), Some(user.as_str()));
        prop_assert_eq!(inbound.frame.text(), Some(text.as_str()));
    }
}
