//! Connection lifecycle for `RoomChat`.
//!
//! The [`ConnectionManager`] owns at most one live transport connection and
//! drives it through
//!
//! ```text
//! Disconnected → Connecting → Open → Closing → Closed(code, was_clean)
//! ```
//!
//! Transports run outside the manager (a tokio task for
//! [`ws::WsConnector`], the test harness for [`loopback::LoopbackConnector`])
//! and report back through a single [`TransportEvent`] channel. Every event is
//! tagged with the [`ConnectionId`] of the connection that produced it, so
//! events from a replaced or closed connection are recognized and ignored.

pub mod loopback;
pub mod ws;

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use roomchat_proto::codec::{self, CodecError, Origin};
use roomchat_proto::frame::Frame;

/// Close code for an orderly shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the peer closed without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code for a connection that dropped without a close handshake.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Identifier of one transport connection. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh, time-ordered connection identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been opened.
    Disconnected,
    /// The transport is being established.
    Connecting,
    /// Frames can be exchanged.
    Open,
    /// A close handshake is in progress.
    Closing,
    /// Terminal state for this connection.
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Whether the close was an orderly shutdown.
        was_clean: bool,
    },
}

impl ConnectionState {
    /// Whether frames can be sent.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether the connection has reached its terminal state.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed {
                code,
                was_clean: true,
            } => write!(f, "closed (code {code})"),
            Self::Closed {
                code,
                was_clean: false,
            } => write!(f, "lost (code {code})"),
        }
    }
}

/// Raw event reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// The handshake completed.
    Opened,
    /// A text payload arrived.
    Text(String),
    /// The remote side started a close handshake.
    CloseRequested {
        /// Close code sent by the remote side.
        code: u16,
    },
    /// The transport is torn down. Always the last event of a connection.
    Closed {
        /// Close code.
        code: u16,
        /// Whether a close handshake completed.
        was_clean: bool,
    },
    /// A transport fault. Usually followed by `Closed`.
    Error(String),
}

/// A [`TransportEventKind`] tagged with the connection it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Connection that produced the event.
    pub connection: ConnectionId,
    /// What happened.
    pub kind: TransportEventKind,
}

/// Sending half of the transport event channel handed to connectors.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Protocol-level event produced by [`ConnectionManager::handle_transport_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection is open.
    Opened,
    /// A frame arrived. Unparseable payloads arrive as system frames.
    Frame(Frame),
    /// The connection closed.
    Closed {
        /// Close code.
        code: u16,
        /// Whether the close was orderly.
        was_clean: bool,
    },
    /// A transport fault was reported.
    Error(String),
}

/// Instruction for a transport's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write one text frame.
    Text(String),
    /// Start the close handshake. Nothing is written after this.
    Close {
        /// Close code to send.
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// Errors raised by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport is no longer accepting writes.
    #[error("connection closed")]
    ConnectionClosed,

    /// The handshake did not complete in time.
    #[error("connection timed out")]
    Timeout,

    /// The endpoint could not be reached.
    #[error("server {0} is unreachable")]
    Unreachable(String),

    /// A WebSocket protocol or I/O failure.
    #[error("websocket error: {0}")]
    WebSocket(String),
}

/// Errors raised by [`ConnectionManager::send`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Frames can only be sent on an open connection.
    #[error("connection is not open (state: {0})")]
    NotOpen(ConnectionState),

    /// The frame could not be serialized.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transport rejected the write.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Writer side of a transport connection, returned by a [`Connector`].
///
/// Writes are queued on an unbounded channel, so sending never blocks the
/// caller. The optional task handle lets hosts wait for the transport to
/// finish flushing after a close.
#[derive(Debug)]
pub struct Link {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: Option<JoinHandle<()>>,
}

impl Link {
    /// Wrap the outbound queue (and background task, if any) of a transport.
    #[must_use]
    pub const fn new(outbound: mpsc::UnboundedSender<Outbound>, task: Option<JoinHandle<()>>) -> Self {
        Self { outbound, task }
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn close(&self, code: u16, reason: &str) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Close {
                code,
                reason: reason.to_string(),
            })
            .map_err(|_| TransportError::ConnectionClosed)
    }

    const fn take_task(&mut self) -> Option<JoinHandle<()>> {
        self.task.take()
    }
}

/// Opens transport connections.
///
/// Implementations must not fail synchronously: an unreachable endpoint or
/// failed handshake is reported through `events` as `Error` followed by
/// `Closed`.
pub trait Connector {
    /// Start connecting to `endpoint`, tagging every event with `id`.
    fn connect(&self, endpoint: &str, id: ConnectionId, events: EventSender) -> Link;
}

struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    link: Link,
}

/// Owns the current connection and maps transport events to protocol events.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    current: Option<Connection>,
    /// Links replaced by a newer `open()`, kept so their tasks can be awaited.
    retired: Vec<Link>,
    events_tx: EventSender,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager with no connection.
    pub fn new(connector: C) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            current: None,
            retired: Vec::new(),
            events_tx,
            events_rx,
        }
    }

    /// State of the current connection, or `Disconnected` if none was opened.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.current
            .as_ref()
            .map_or(ConnectionState::Disconnected, |c| c.state)
    }

    /// Identifier of the current connection, if any.
    #[must_use]
    pub fn handle(&self) -> Option<ConnectionId> {
        self.current.as_ref().map(|c| c.id)
    }

    /// Open a fresh connection to `endpoint`.
    ///
    /// Any previous connection is closed (if still live) and its handle is
    /// invalidated: its later events are ignored.
    pub fn open(&mut self, endpoint: &str) -> ConnectionId {
        if let Some(previous) = self.current.take() {
            if !previous.state.is_closed() {
                tracing::info!(connection = %previous.id, "replacing live connection");
                if let Err(e) = previous.link.close(CLOSE_NORMAL, "replaced") {
                    tracing::debug!(connection = %previous.id, err = %e, "transport already gone at replace");
                }
            }
            self.retired.push(previous.link);
        }

        let id = ConnectionId::new();
        tracing::info!(connection = %id, endpoint, "opening connection");
        let link = self.connector.connect(endpoint, id, self.events_tx.clone());
        self.current = Some(Connection {
            id,
            state: ConnectionState::Connecting,
            link,
        });
        id
    }

    /// Serialize `frame` and queue it on the open connection.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::NotOpen`] if there is no open connection; nothing
    ///   is written.
    /// - [`ConnectionError::Codec`] if the frame cannot be serialized.
    /// - [`ConnectionError::Transport`] if the transport stopped accepting writes.
    pub fn send(&self, frame: &Frame) -> Result<(), ConnectionError> {
        let Some(conn) = self.current.as_ref().filter(|c| c.state.is_open()) else {
            let state = self.state();
            tracing::warn!(kind = %frame.kind(), state = %state, "dropping frame: connection not open");
            return Err(ConnectionError::NotOpen(state));
        };
        write_frame(conn, frame)
    }

    /// Close the current connection.
    ///
    /// Moves to `Closing`, writes `final_frame` if the connection was open,
    /// starts the transport close handshake, and settles in
    /// `Closed(code, clean)`. The handle is abandoned: events the transport
    /// reports afterwards are ignored.
    ///
    /// Returns `false` (and does nothing) if there is no live connection, or
    /// if the remote side is already closing; the transport's own `Closed`
    /// event settles that one.
    pub fn close(&mut self, code: u16, reason: &str, final_frame: Option<&Frame>) -> bool {
        let Some(conn) = self.current.as_mut() else {
            return false;
        };
        match conn.state {
            ConnectionState::Disconnected | ConnectionState::Closed { .. } => return false,
            ConnectionState::Closing => {
                tracing::debug!(connection = %conn.id, "remote close in progress, not closing again");
                return false;
            }
            ConnectionState::Connecting | ConnectionState::Open => {}
        }

        let was_open = conn.state.is_open();
        conn.state = ConnectionState::Closing;

        if was_open && let Some(frame) = final_frame {
            if let Err(e) = write_frame(conn, frame) {
                tracing::warn!(connection = %conn.id, err = %e, "failed to flush final frame");
            }
        }
        if let Err(e) = conn.link.close(code, reason) {
            tracing::debug!(connection = %conn.id, err = %e, "transport already gone at close");
        }

        conn.state = ConnectionState::Closed {
            code,
            was_clean: true,
        };
        tracing::info!(connection = %conn.id, code, reason, "connection closed locally");
        true
    }

    /// Apply a transport event to the state machine.
    ///
    /// Returns the protocol event to dispatch, or `None` if the event was
    /// stale (wrong connection, or the connection is already `Closed`) or
    /// only changed internal state.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Option<ConnectionEvent> {
        let Some(conn) = self
            .current
            .as_mut()
            .filter(|c| c.id == event.connection)
        else {
            tracing::debug!(connection = %event.connection, "ignoring event from stale connection");
            return None;
        };

        match (conn.state, event.kind) {
            (ConnectionState::Closed { .. }, kind) => {
                tracing::trace!(connection = %conn.id, ?kind, "ignoring event after close");
                None
            }
            (ConnectionState::Connecting, TransportEventKind::Opened) => {
                conn.state = ConnectionState::Open;
                tracing::info!(connection = %conn.id, "connection open");
                Some(ConnectionEvent::Opened)
            }
            (state, TransportEventKind::Opened) => {
                tracing::warn!(connection = %conn.id, %state, "unexpected open event");
                None
            }
            (ConnectionState::Open, TransportEventKind::Text(text)) => {
                let inbound = codec::decode_inbound(&text);
                if inbound.origin != Origin::Structured {
                    tracing::debug!(
                        connection = %conn.id,
                        origin = ?inbound.origin,
                        "inbound payload is not a known frame, keeping it as a notice"
                    );
                }
                Some(ConnectionEvent::Frame(inbound.frame))
            }
            (state, TransportEventKind::Text(_)) => {
                tracing::debug!(connection = %conn.id, %state, "ignoring payload outside open state");
                None
            }
            (_, TransportEventKind::CloseRequested { code }) => {
                tracing::info!(connection = %conn.id, code, "remote side is closing");
                conn.state = ConnectionState::Closing;
                None
            }
            (_, TransportEventKind::Closed { code, was_clean }) => {
                conn.state = ConnectionState::Closed { code, was_clean };
                if was_clean {
                    tracing::info!(connection = %conn.id, code, "connection closed");
                } else {
                    tracing::warn!(connection = %conn.id, code, "connection lost");
                }
                Some(ConnectionEvent::Closed { code, was_clean })
            }
            (_, TransportEventKind::Error(description)) => {
                tracing::warn!(connection = %conn.id, error = %description, "transport error");
                Some(ConnectionEvent::Error(description))
            }
        }
    }

    /// Wait for the next transport event.
    ///
    /// The manager keeps a sender alive, so this only returns `None` if the
    /// channel is closed from the outside.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }

    /// Take the next transport event without waiting.
    pub fn try_next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Wait until the background tasks of closed connections have finished.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_closed(&mut self, timeout: Duration) -> bool {
        let mut tasks: Vec<JoinHandle<()>> =
            self.retired.iter_mut().filter_map(Link::take_task).collect();
        self.retired.clear();
        if let Some(conn) = self.current.as_mut().filter(|c| c.state.is_closed())
            && let Some(task) = conn.link.take_task()
        {
            tasks.push(task);
        }

        tokio::time::timeout(timeout, async {
            for task in tasks {
                let _ = task.await;
            }
        })
        .await
        .is_ok()
    }
}

fn write_frame(conn: &Connection, frame: &Frame) -> Result<(), ConnectionError> {
    let text = codec::encode(frame)?;
    conn.link.send_text(text)?;
    tracing::debug!(connection = %conn.id, kind = %frame.kind(), "frame queued");
    Ok(())
}
