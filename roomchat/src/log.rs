//! Ordered, room-filtered message history shown to the user.

use chrono::{DateTime, Local};

use roomchat_proto::frame::Frame;

/// What kind of line a [`LogEntry`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Someone connected.
    Join,
    /// Someone went away.
    Leave,
    /// A chat line.
    Chat,
    /// A server notice or a local connection notice.
    System,
}

/// One line in the message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Entry kind.
    pub kind: EntryKind,
    /// Author or subject of the entry.
    pub user: Option<String>,
    /// Room scope; `None` means global.
    pub room: Option<String>,
    /// Body text. Empty for join/leave announcements.
    pub text: String,
    /// Timestamp supplied by the server, verbatim.
    pub timestamp: Option<String>,
    /// When this client appended the entry.
    pub received_at: DateTime<Local>,
}

impl LogEntry {
    /// Build an entry from an inbound frame.
    ///
    /// Returns `None` for frames that never appear in the log (room lists
    /// and client-only requests).
    #[must_use]
    pub fn from_frame(frame: Frame) -> Option<Self> {
        let (kind, user, room, text, timestamp) = match frame {
            Frame::Chat {
                user,
                text,
                room,
                timestamp,
            } => (EntryKind::Chat, Some(user), room, text, timestamp),
            Frame::System { text, room, user } => (EntryKind::System, user, room, text, None),
            Frame::Join { user } => (EntryKind::Join, Some(user), None, String::new(), None),
            Frame::Leave { user, room } => (EntryKind::Leave, Some(user), room, String::new(), None),
            Frame::RoomList { .. } | Frame::GetRooms { .. } | Frame::JoinRoom { .. } => {
                return None;
            }
        };
        Some(Self {
            kind,
            user,
            room,
            text,
            timestamp,
            received_at: Local::now(),
        })
    }

    /// A global system line generated by this client.
    pub fn local(text: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::System,
            user: None,
            room: None,
            text: text.into(),
            timestamp: None,
            received_at: Local::now(),
        }
    }

    /// Whether the entry belongs in the view of `current_room`.
    #[must_use]
    pub fn is_visible_in(&self, current_room: &str) -> bool {
        self.room.as_deref().is_none_or(|room| room == current_room)
    }
}

/// Messages relevant to the current room, oldest first.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: Vec<LogEntry>,
}

impl MessageLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` if it is global or scoped to `current_room`.
    ///
    /// Returns `true` if the entry was kept.
    pub fn append(&mut self, entry: LogEntry, current_room: &str) -> bool {
        if !entry.is_visible_in(current_room) {
            tracing::trace!(
                room = entry.room.as_deref().unwrap_or_default(),
                current_room,
                "dropping entry for another room"
            );
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Most recent entry.
    #[must_use]
    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_from_chat_frame() {
        let entry = LogEntry::from_frame(Frame::chat("bob", "general", "hi")).unwrap();
        assert_eq!(entry.kind, EntryKind::Chat);
        assert_eq!(entry.user.as_deref(), Some("bob"));
        assert_eq!(entry.room.as_deref(), Some("general"));
        assert_eq!(entry.text, "hi");
    }

    #[test]
    fn room_list_is_not_a_log_entry() {
        assert!(LogEntry::from_frame(Frame::RoomList { rooms: vec![] }).is_none());
        assert!(LogEntry::from_frame(Frame::GetRooms { user: "a".into() }).is_none());
    }

    #[test]
    fn leave_frame_keeps_room() {
        let entry = LogEntry::from_frame(Frame::Leave {
            user: "bob".into(),
            room: Some("devs".into()),
        })
        .unwrap();
        assert_eq!(entry.kind, EntryKind::Leave);
        assert!(!entry.is_visible_in("general"));
    }

    #[test]
    fn append_filters_other_rooms() {
        let mut log = MessageLog::new();
        let other = LogEntry::from_frame(Frame::chat("bob", "devs", "hi")).unwrap();
        assert!(!log.append(other, "general"));
        assert!(log.is_empty());
    }

    #[test]
    fn append_keeps_global_and_current_room() {
        let mut log = MessageLog::new();
        assert!(log.append(LogEntry::local("connected"), "general"));
        let here = LogEntry::from_frame(Frame::chat("bob", "general", "hi")).unwrap();
        assert!(log.append(here, "general"));
        assert_eq!(log.len(), 2);
        assert_eq!(log.last().map(|e| e.text.as_str()), Some("hi"));
    }

    #[test]
    fn clear_empties_log() {
        let mut log = MessageLog::new();
        log.append(LogEntry::local("x"), "general");
        log.clear();
        assert!(log.is_empty());
    }
}
