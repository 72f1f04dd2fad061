//! Room directory for the server.
//!
//! Rooms are created on first use and never removed. The directory keeps
//! creation order, which is the order `room_list` reports.

use roomchat_proto::frame::DEFAULT_ROOM;
use tokio::sync::RwLock;

/// In-memory list of room names in creation order.
pub struct RoomDirectory {
    rooms: RwLock<Vec<String>>,
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomDirectory {
    /// A directory holding only `general`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(vec![DEFAULT_ROOM.to_string()]),
        }
    }

    /// Add `name` if it does not exist yet. Returns `true` if it was created.
    pub async fn ensure(&self, name: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if rooms.iter().any(|r| r == name) {
            return false;
        }
        rooms.push(name.to_string());
        tracing::info!(room = name, total = rooms.len(), "room created");
        true
    }

    /// All room names, oldest first.
    pub async fn list(&self) -> Vec<String> {
        self.rooms.read().await.clone()
    }
}
