//! Session controller: ties identity, connection, rooms, and the message log
//! together.
//!
//! A [`Session`] is a single-owner object. The host drives it from one task:
//! user actions go through [`Session::set_identity`],
//! [`Session::send_message`], [`Session::join_room`],
//! [`Session::create_room`] and [`Session::end`]; transport events are fed
//! back in through [`Session::handle_event`] (or [`Session::drain_events`]).
//! Every observable change is also published as a [`SessionEvent`].

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

use roomchat_proto::frame::{DEFAULT_ROOM, Frame};

use crate::connection::{
    CLOSE_NORMAL, ConnectionEvent, ConnectionManager, ConnectionState, Connector, TransportEvent,
};
use crate::log::{LogEntry, MessageLog};
use crate::rooms::RoomRegistry;

/// Close reason sent when the user ends the session.
const END_REASON: &str = "session ended";

/// A validated display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Trim `name` and reject it if nothing is left.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// The display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Change notifications for UI layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection moved to a new state.
    ConnectionChanged(ConnectionState),
    /// The known room set changed.
    RoomsUpdated(Vec<String>),
    /// The current room changed.
    RoomChanged(String),
    /// An entry was added to the log.
    MessageAppended(LogEntry),
    /// The log was emptied.
    LogCleared,
}

/// One user's chat session.
pub struct Session<C: Connector> {
    endpoint: String,
    identity: Option<Identity>,
    connection: ConnectionManager<C>,
    rooms: RoomRegistry,
    log: MessageLog,
    observers: mpsc::UnboundedSender<SessionEvent>,
}

impl<C: Connector> Session<C> {
    /// Create an idle session that will connect to `endpoint` once an
    /// identity is set. Returns the session and its change feed.
    pub fn new(
        connector: C,
        endpoint: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (observers, feed) = mpsc::unbounded_channel();
        let session = Self {
            endpoint: endpoint.into(),
            identity: None,
            connection: ConnectionManager::new(connector),
            rooms: RoomRegistry::new(),
            log: MessageLog::new(),
            observers,
        };
        (session, feed)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Server endpoint this session connects to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The committed display name, if a session is active.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// State of the underlying connection.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Room messages are sent to and filtered by.
    #[must_use]
    pub fn current_room(&self) -> &str {
        self.rooms.current()
    }

    /// Known rooms, in server order.
    #[must_use]
    pub fn rooms(&self) -> &[String] {
        self.rooms.known_rooms()
    }

    /// The message log for the current room.
    #[must_use]
    pub const fn log(&self) -> &MessageLog {
        &self.log
    }

    // -----------------------------------------------------------------------
    // User actions
    // -----------------------------------------------------------------------

    /// Commit a display name and start connecting.
    ///
    /// Returns `false` if the trimmed name is empty or an identity is
    /// already set (call [`Session::end`] first). A fresh session starts in
    /// `general` with an empty log.
    pub fn set_identity(&mut self, name: &str) -> bool {
        if let Some(current) = &self.identity {
            tracing::warn!(current = %current, "identity already set, end the session first");
            return false;
        }
        let Some(identity) = Identity::parse(name) else {
            tracing::debug!("rejecting empty display name");
            return false;
        };

        tracing::info!(user = %identity, endpoint = %self.endpoint, "starting session");
        self.identity = Some(identity);

        self.rooms.reset();
        self.log.clear();
        self.notify(SessionEvent::RoomsUpdated(Vec::new()));
        self.notify(SessionEvent::RoomChanged(self.rooms.current().to_string()));
        self.notify(SessionEvent::LogCleared);

        self.connection.open(&self.endpoint);
        self.notify(SessionEvent::ConnectionChanged(self.connection.state()));
        true
    }

    /// Send a chat line to the current room.
    ///
    /// Whitespace-only text is rejected, as is any send while the connection
    /// is not open. The text goes out untrimmed. The line shows up in the
    /// log when the server echoes it back.
    pub fn send_message(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let Some(identity) = &self.identity else {
            tracing::debug!("no identity, message not sent");
            return false;
        };
        let frame = Frame::chat(identity.name(), self.rooms.current(), text);
        match self.connection.send(&frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(err = %e, "message not sent");
                false
            }
        }
    }

    /// Switch to `room`, announcing it to the server when connected.
    ///
    /// The switch is optimistic: the room becomes current right away, is
    /// added to the known set if new, and the log is emptied.
    pub fn join_room(&mut self, room: &str) -> bool {
        if room.trim().is_empty() {
            tracing::debug!("rejecting empty room name");
            return false;
        }

        if let Some(identity) = &self.identity {
            if self.connection.state().is_open() {
                let frame = Frame::JoinRoom {
                    user: identity.name().to_string(),
                    room: room.to_string(),
                };
                if let Err(e) = self.connection.send(&frame) {
                    tracing::debug!(room, err = %e, "room switch not announced");
                }
            } else {
                tracing::debug!(room, "not open yet, room is announced on open");
            }
        }

        tracing::info!(room, "switching room");
        if self.rooms.select(room) {
            self.notify(SessionEvent::RoomsUpdated(self.rooms.known_rooms().to_vec()));
        }
        self.notify(SessionEvent::RoomChanged(room.to_string()));
        self.log.clear();
        self.notify(SessionEvent::LogCleared);
        true
    }

    /// Create (and switch to) a room. The name is trimmed first.
    pub fn create_room(&mut self, room: &str) -> bool {
        let trimmed = room.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.join_room(trimmed)
    }

    /// End the session: announce `leave` if connected, then close.
    ///
    /// Afterwards the identity is cleared and a new session can be started
    /// with [`Session::set_identity`]. Does nothing if no session is active.
    pub fn end(&mut self) {
        let Some(identity) = self.identity.take() else {
            return;
        };

        let leave = Frame::Leave {
            user: identity.name().to_string(),
            room: Some(self.rooms.current().to_string()),
        };
        if self.connection.close(CLOSE_NORMAL, END_REASON, Some(&leave)) {
            self.notify(SessionEvent::ConnectionChanged(self.connection.state()));
            self.push_local(format!("disconnected cleanly (code {CLOSE_NORMAL})"));
        }
        tracing::info!(user = %identity, "session ended");
    }

    // -----------------------------------------------------------------------
    // Event pump
    // -----------------------------------------------------------------------

    /// Wait for the next transport event. Feed it to [`Session::handle_event`].
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.connection.next_event().await
    }

    /// Handle every transport event that is already queued. Returns how many
    /// events were consumed.
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.connection.try_next_event() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait for closed connections to finish flushing, e.g. the `leave`
    /// frame written by [`Session::end`].
    pub async fn wait_closed(&mut self, timeout: Duration) -> bool {
        self.connection.wait_closed(timeout).await
    }

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        let before = self.connection.state();
        let outcome = self.connection.handle_transport_event(event);
        let after = self.connection.state();
        if before != after {
            self.notify(SessionEvent::ConnectionChanged(after));
        }

        match outcome {
            None => {}
            Some(ConnectionEvent::Opened) => self.on_open(),
            Some(ConnectionEvent::Frame(frame)) => self.on_frame(frame),
            Some(ConnectionEvent::Closed { code, was_clean }) => {
                if was_clean {
                    self.push_local(format!("disconnected cleanly (code {code})"));
                } else {
                    self.push_local(format!("connection lost (code {code})"));
                }
            }
            Some(ConnectionEvent::Error(description)) => {
                self.push_local(format!("connection error: {description}"));
            }
        }
    }

    fn on_open(&mut self) {
        let Some(user) = self.identity.as_ref().map(|i| i.name().to_string()) else {
            return;
        };
        let mut handshake = vec![
            Frame::Join { user: user.clone() },
            Frame::GetRooms { user: user.clone() },
        ];
        // A room picked while connecting has not reached the server yet.
        let room = self.rooms.current();
        if room != DEFAULT_ROOM {
            handshake.push(Frame::JoinRoom {
                user,
                room: room.to_string(),
            });
        }
        for frame in handshake {
            if let Err(e) = self.connection.send(&frame) {
                tracing::warn!(kind = %frame.kind(), err = %e, "handshake frame not sent");
            }
        }
        self.push_local("connected");
    }

    fn on_frame(&mut self, frame: Frame) {
        match frame {
            Frame::RoomList { rooms } => {
                self.rooms.update_from_server(rooms);
                self.notify(SessionEvent::RoomsUpdated(self.rooms.known_rooms().to_vec()));
            }
            Frame::GetRooms { .. } | Frame::JoinRoom { .. } => {
                tracing::debug!(kind = %frame.kind(), "ignoring client-only frame from server");
            }
            other => {
                if let Some(entry) = LogEntry::from_frame(other) {
                    self.append(entry);
                }
            }
        }
    }

    fn push_local(&mut self, text: impl Into<String>) {
        self.append(LogEntry::local(text));
    }

    fn append(&mut self, entry: LogEntry) {
        if self.log.append(entry.clone(), self.rooms.current()) {
            self.notify(SessionEvent::MessageAppended(entry));
        }
    }

    fn notify(&self, event: SessionEvent) {
        // Nobody listening is fine.
        let _ = self.observers.send(event);
    }
}
