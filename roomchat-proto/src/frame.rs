//! Frame types for the `RoomChat` wire protocol.
//!
//! Every frame carries a `type` discriminator. Client-originated frames
//! always carry the sender's display name in `user`; the server uses it to
//! check that a connection only speaks for the identity it joined with.

use serde::{Deserialize, Serialize};

/// Name of the room every connection starts in.
pub const DEFAULT_ROOM: &str = "general";

/// One discrete message exchanged over the persistent connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client announces itself after the connection opens.
    Join {
        /// Display name of the joining user.
        user: String,
    },

    /// Client announces it is going away, right before closing.
    Leave {
        /// Display name of the leaving user.
        user: String,
        /// Room the user was in when leaving.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
    },

    /// Client asks for the current room directory.
    GetRooms {
        /// Display name of the requesting user.
        user: String,
    },

    /// Server answers with the authoritative room directory.
    RoomList {
        /// Room names in server order.
        rooms: Vec<String>,
    },

    /// Client switches to (or creates) a room.
    JoinRoom {
        /// Display name of the user switching rooms.
        user: String,
        /// Target room name.
        room: String,
    },

    /// A chat line. Sent by clients and broadcast by the server.
    #[serde(rename = "message")]
    Chat {
        /// Author of the message.
        user: String,
        /// Message body.
        text: String,
        /// Room the message is scoped to; absent means global.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        /// Server-side timestamp, present on replayed history.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },

    /// A notice generated by the server (or locally by the client).
    System {
        /// Notice text.
        text: String,
        /// Room the notice is scoped to; absent means global.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        /// User the notice is about, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
    },
}

/// Discriminant of a [`Frame`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// `join`
    Join,
    /// `leave`
    Leave,
    /// `get_rooms`
    GetRooms,
    /// `room_list`
    RoomList,
    /// `join_room`
    JoinRoom,
    /// `message`
    Chat,
    /// `system`
    System,
}

impl FrameKind {
    /// The `type` tag used on the wire.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::GetRooms => "get_rooms",
            Self::RoomList => "room_list",
            Self::JoinRoom => "join_room",
            Self::Chat => "message",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl Frame {
    /// Build a chat frame scoped to `room`.
    pub fn chat(user: impl Into<String>, room: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Chat {
            user: user.into(),
            text: text.into(),
            room: Some(room.into()),
            timestamp: None,
        }
    }

    /// Build a global system notice.
    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            text: text.into(),
            room: None,
            user: None,
        }
    }

    /// Return the discriminant of this frame.
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        match self {
            Self::Join { .. } => FrameKind::Join,
            Self::Leave { .. } => FrameKind::Leave,
            Self::GetRooms { .. } => FrameKind::GetRooms,
            Self::RoomList { .. } => FrameKind::RoomList,
            Self::JoinRoom { .. } => FrameKind::JoinRoom,
            Self::Chat { .. } => FrameKind::Chat,
            Self::System { .. } => FrameKind::System,
        }
    }

    /// Room this frame is addressed to, if it carries one.
    #[must_use]
    pub fn room(&self) -> Option<&str> {
        match self {
            Self::JoinRoom { room, .. } => Some(room.as_str()),
            Self::Leave { room, .. } | Self::Chat { room, .. } | Self::System { room, .. } => {
                room.as_deref()
            }
            Self::Join { .. } | Self::GetRooms { .. } | Self::RoomList { .. } => None,
        }
    }

    /// User this frame is stamped with, if any.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        match self {
            Self::Join { user }
            | Self::Leave { user, .. }
            | Self::GetRooms { user }
            | Self::JoinRoom { user, .. }
            | Self::Chat { user, .. } => Some(user.as_str()),
            Self::System { user, .. } => user.as_deref(),
            Self::RoomList { .. } => None,
        }
    }

    /// Text body of the frame, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Chat { text, .. } | Self::System { text, .. } => Some(text.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_protocol_table() {
        assert_eq!(FrameKind::Join.wire_name(), "join");
        assert_eq!(FrameKind::GetRooms.wire_name(), "get_rooms");
        assert_eq!(FrameKind::RoomList.wire_name(), "room_list");
        assert_eq!(FrameKind::JoinRoom.wire_name(), "join_room");
        assert_eq!(FrameKind::Chat.to_string(), "message");
    }

    #[test]
    fn room_accessor_covers_scoped_frames() {
        assert_eq!(Frame::chat("a", "r1", "hi").room(), Some("r1"));
        assert_eq!(
            Frame::JoinRoom {
                user: "a".into(),
                room: "devs".into()
            }
            .room(),
            Some("devs")
        );
        assert_eq!(Frame::system("x").room(), None);
        assert_eq!(Frame::Join { user: "a".into() }.room(), None);
    }

    #[test]
    fn user_accessor() {
        assert_eq!(Frame::chat("alice", "r", "t").user(), Some("alice"));
        assert_eq!(Frame::RoomList { rooms: vec![] }.user(), None);
        assert_eq!(Frame::system("x").user(), None);
    }

    #[test]
    fn text_accessor() {
        assert_eq!(Frame::system("hello").text(), Some("hello"));
        assert_eq!(Frame::GetRooms { user: "a".into() }.text(), None);
    }
}
