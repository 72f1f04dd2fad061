//! Client-side view of the room directory.
//!
//! The server's `room_list` is authoritative and replaces the known set
//! verbatim. Switching to a room the client has not heard of yet adds it
//! optimistically so the UI can show it before the server confirms.

use roomchat_proto::frame::DEFAULT_ROOM;

/// Known rooms and the room this client is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRegistry {
    known: Vec<String>,
    current: String,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// Empty directory, current room `general`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            known: Vec::new(),
            current: DEFAULT_ROOM.to_string(),
        }
    }

    /// Rooms in the order the server (or local selection) listed them.
    #[must_use]
    pub fn known_rooms(&self) -> &[String] {
        &self.known
    }

    /// The room new messages are sent to and filtered by.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Whether `room` is in the known set.
    #[must_use]
    pub fn contains(&self, room: &str) -> bool {
        self.known.iter().any(|r| r == room)
    }

    /// Replace the known set with the server's list, as-is.
    ///
    /// The current room is left alone even if the list does not mention it.
    pub fn update_from_server(&mut self, rooms: Vec<String>) {
        tracing::debug!(count = rooms.len(), "room list updated");
        self.known = rooms;
    }

    /// Make `room` current, adding it to the known set if it is new.
    ///
    /// Returns `true` if the room was added.
    pub fn select(&mut self, room: &str) -> bool {
        let added = !self.contains(room);
        if added {
            self.known.push(room.to_string());
        }
        room.clone_into(&mut self.current);
        added
    }

    /// Forget everything and go back to `general`.
    pub fn reset(&mut self) {
        self.known.clear();
        DEFAULT_ROOM.clone_into(&mut self.current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn starts_empty_in_general() {
        let registry = RoomRegistry::new();
        assert!(registry.known_rooms().is_empty());
        assert_eq!(registry.current(), "general");
    }

    #[test]
    fn server_list_replaces_verbatim() {
        let mut registry = RoomRegistry::new();
        registry.select("scratch");
        registry.update_from_server(names(&["general", "devs", "general"]));
        assert_eq!(registry.known_rooms(), names(&["general", "devs", "general"]));
    }

    #[test]
    fn select_appends_unknown_room_once() {
        let mut registry = RoomRegistry::new();
        registry.update_from_server(names(&["general"]));
        assert!(registry.select("devs"));
        assert!(!registry.select("devs"));
        assert_eq!(registry.known_rooms(), names(&["general", "devs"]));
        assert_eq!(registry.current(), "devs");
    }

    #[test]
    fn select_known_room_keeps_order() {
        let mut registry = RoomRegistry::new();
        registry.update_from_server(names(&["general", "devs", "ops"]));
        assert!(!registry.select("general"));
        assert_eq!(registry.known_rooms(), names(&["general", "devs", "ops"]));
    }

    #[test]
    fn unconfirmed_current_room_survives_server_list() {
        let mut registry = RoomRegistry::new();
        registry.select("pending");
        registry.update_from_server(names(&["general"]));
        assert_eq!(registry.current(), "pending");
        assert!(!registry.contains("pending"));
    }

    #[test]
    fn reset_returns_to_general() {
        let mut registry = RoomRegistry::new();
        registry.update_from_server(names(&["general", "devs"]));
        registry.select("devs");
        registry.reset();
        assert_eq!(registry, RoomRegistry::new());
    }
}
