//! In-process connector for driving a session without a network.
//!
//! Every call to [`Connector::connect`] produces a [`LoopbackPeer`] which the
//! test (or a host embedding the session) takes with
//! [`LoopbackConnector::take_peer`]. The peer plays the server side: it
//! decides when the connection opens, pushes payloads, and inspects what the
//! client wrote.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use roomchat_proto::codec;
use roomchat_proto::frame::Frame;

use super::{
    CLOSE_ABNORMAL, ConnectionId, Connector, EventSender, Link, Outbound, TransportEvent,
    TransportEventKind,
};

/// Connector that hands each new connection to the caller as a [`LoopbackPeer`].
///
/// Clones share the same peer queue.
#[derive(Clone, Default)]
pub struct LoopbackConnector {
    peers: Arc<Mutex<VecDeque<LoopbackPeer>>>,
    connects: Arc<Mutex<usize>>,
}

impl LoopbackConnector {
    /// Create a connector with no pending peers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the oldest connection not yet claimed.
    #[must_use]
    pub fn take_peer(&self) -> Option<LoopbackPeer> {
        self.peers.lock().pop_front()
    }

    /// Total number of connections opened through this connector.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        *self.connects.lock()
    }
}

impl Connector for LoopbackConnector {
    fn connect(&self, endpoint: &str, id: ConnectionId, events: EventSender) -> Link {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.connects.lock() += 1;
        self.peers.lock().push_back(LoopbackPeer {
            id,
            endpoint: endpoint.to_string(),
            outbound: outbound_rx,
            events,
        });
        tracing::debug!(connection = %id, endpoint, "loopback connection created");
        Link::new(outbound_tx, None)
    }
}

/// Server side of one loopback connection.
pub struct LoopbackPeer {
    id: ConnectionId,
    endpoint: String,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    events: EventSender,
}

impl LoopbackPeer {
    /// Identifier the client assigned to this connection.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Endpoint the client asked for.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Report an arbitrary transport event.
    pub fn push(&self, kind: TransportEventKind) {
        let _ = self.events.send(TransportEvent {
            connection: self.id,
            kind,
        });
    }

    /// Complete the handshake.
    pub fn open(&self) {
        self.push(TransportEventKind::Opened);
    }

    /// Deliver a raw text payload.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push(TransportEventKind::Text(text.into()));
    }

    /// Deliver a frame as JSON.
    pub fn push_frame(&self, frame: &Frame) {
        match codec::encode(frame) {
            Ok(text) => self.push_text(text),
            Err(e) => tracing::warn!(err = %e, "loopback peer could not encode frame"),
        }
    }

    /// Close from the server side. A clean close goes through the close
    /// handshake; an unclean one just drops.
    pub fn close(&self, code: u16, was_clean: bool) {
        if was_clean {
            self.push(TransportEventKind::CloseRequested { code });
        }
        self.push(TransportEventKind::Closed { code, was_clean });
    }

    /// Report a transport fault without closing.
    pub fn error(&self, description: impl Into<String>) {
        self.push(TransportEventKind::Error(description.into()));
    }

    /// Fail the connection the way an unreachable server does.
    pub fn fail(&self, description: impl Into<String>) {
        self.error(description);
        self.push(TransportEventKind::Closed {
            code: CLOSE_ABNORMAL,
            was_clean: false,
        });
    }

    /// Drain everything the client has written so far.
    pub fn sent(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(item) = self.outbound.try_recv() {
            out.push(item);
        }
        out
    }

    /// Drain the client's writes and decode the text frames among them.
    ///
    /// Close instructions and undecodable payloads are skipped.
    pub fn sent_frames(&mut self) -> Vec<Frame> {
        self.sent()
            .into_iter()
            .filter_map(|item| match item {
                Outbound::Text(text) => codec::decode(&text).ok(),
                Outbound::Close { .. } => None,
            })
            .collect()
    }
}
