//! Server core: shared state, WebSocket handler, and frame routing.
//!
//! Every socket gets a connection id and a writer task fed by an unbounded
//! channel. A connection is anonymous until it sends `join`; after that it
//! may only speak as the name it joined with. Chat lines carrying a `room`
//! go to that room's members, others go to everyone.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use roomchat_proto::codec;
use roomchat_proto::frame::{DEFAULT_ROOM, Frame};
use tokio::sync::{RwLock, mpsc};

use crate::rooms::RoomDirectory;

/// Reply text for payloads that are not JSON.
pub const MALFORMED_REPLY: &str = "malformed message";

/// Server-local connection identifier.
pub type ConnId = u64;

struct Client {
    user: Option<String>,
    room: Option<String>,
    tx: mpsc::UnboundedSender<Message>,
}

/// Who a broadcast goes to.
#[derive(Debug, Clone, Copy)]
enum Scope<'a> {
    Everyone,
    Room(&'a str),
}

/// Shared server state: connected clients and the room directory.
pub struct ServerState {
    clients: RwLock<HashMap<ConnId, Client>>,
    /// Rooms in creation order.
    pub rooms: RoomDirectory,
    next_id: AtomicU64,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    /// Empty state with only the `general` room.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            rooms: RoomDirectory::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of connections that have joined with a name.
    pub async fn joined_count(&self) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.user.is_some())
            .count()
    }

    /// Names of joined users currently in `room`.
    pub async fn members(&self, room: &str) -> Vec<String> {
        let clients = self.clients.read().await;
        let mut names: Vec<String> = clients
            .values()
            .filter(|c| c.room.as_deref() == Some(room))
            .filter_map(|c| c.user.clone())
            .collect();
        names.sort();
        names
    }

    /// Send a close frame to every connection.
    pub async fn close_all_connections(&self) {
        let clients = self.clients.read().await;
        for (id, client) in clients.iter() {
            tracing::info!(conn = id, "sending close frame");
            let _ = client.tx.send(Message::Close(None));
        }
    }

    async fn connect(&self, tx: mpsc::UnboundedSender<Message>) -> ConnId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.write().await.insert(
            id,
            Client {
                user: None,
                room: None,
                tx,
            },
        );
        id
    }

    async fn disconnect(&self, id: ConnId) {
        self.depart(id).await;
        self.clients.write().await.remove(&id);
    }

    /// The name `id` joined with, if any.
    async fn user_of(&self, id: ConnId) -> Option<String> {
        self.clients.read().await.get(&id).and_then(|c| c.user.clone())
    }

    async fn send_to(&self, id: ConnId, frame: &Frame) {
        let Some(message) = to_message(frame) else {
            return;
        };
        if let Some(client) = self.clients.read().await.get(&id) {
            let _ = client.tx.send(message);
        }
    }

    async fn broadcast(&self, scope: Scope<'_>, frame: &Frame) {
        let Some(message) = to_message(frame) else {
            return;
        };
        let clients = self.clients.read().await;
        let mut delivered = 0usize;
        for client in clients.values().filter(|c| c.user.is_some()) {
            let in_scope = match scope {
                Scope::Everyone => true,
                Scope::Room(room) => client.room.as_deref() == Some(room),
            };
            if in_scope && client.tx.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        tracing::debug!(kind = %frame.kind(), ?scope, delivered, "broadcast");
    }

    /// Register `user` on connection `id` and put it in `general`.
    async fn join(&self, id: ConnId, user: String) {
        {
            let mut clients = self.clients.write().await;
            let Some(client) = clients.get_mut(&id) else {
                return;
            };
            if let Some(existing) = &client.user {
                tracing::warn!(conn = id, existing = %existing, "ignoring repeated join");
                return;
            }
            client.user = Some(user.clone());
        }
        tracing::info!(conn = id, user = %user, "user joined");
        self.broadcast(
            Scope::Everyone,
            &system(format!("'{user}' joined the chat."), None, &user),
        )
        .await;
        self.enter_room(id, &user, DEFAULT_ROOM).await;
    }

    /// Move connection `id` into `room`, notifying the old and new room.
    async fn enter_room(&self, id: ConnId, user: &str, room: &str) {
        self.rooms.ensure(room).await;
        let previous = {
            let mut clients = self.clients.write().await;
            let Some(client) = clients.get_mut(&id) else {
                return;
            };
            client.room.replace(room.to_string())
        };

        if let Some(previous) = previous.filter(|p| p != room) {
            self.broadcast(
                Scope::Room(&previous),
                &system(format!("'{user}' left room '{previous}'."), Some(&previous), user),
            )
            .await;
        }
        tracing::info!(conn = id, user, room, "user entered room");
        self.broadcast(
            Scope::Room(room),
            &system(format!("'{user}' joined room '{room}'."), Some(room), user),
        )
        .await;
    }

    /// Forget the identity of `id` and tell the others.
    async fn depart(&self, id: ConnId) {
        let (user, room) = {
            let mut clients = self.clients.write().await;
            let Some(client) = clients.get_mut(&id) else {
                return;
            };
            let Some(user) = client.user.take() else {
                return;
            };
            (user, client.room.take())
        };

        tracing::info!(conn = id, user = %user, "user left");
        if let Some(room) = room {
            self.broadcast(
                Scope::Room(&room),
                &system(format!("'{user}' left room '{room}'."), Some(&room), &user),
            )
            .await;
        }
        self.broadcast(
            Scope::Everyone,
            &system(format!("'{user}' left the chat."), None, &user),
        )
        .await;
    }
}

fn system(text: String, room: Option<&str>, user: &str) -> Frame {
    Frame::System {
        text,
        room: room.map(str::to_string),
        user: Some(user.to_string()),
    }
}

fn to_message(frame: &Frame) -> Option<Message> {
    match codec::encode(frame) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(kind = %frame.kind(), error = %e, "failed to encode frame");
            None
        }
    }
}

/// Handles an upgraded WebSocket connection.
///
/// The connection lifecycle:
/// 1. Register an anonymous connection with its writer channel.
/// 2. Route incoming text frames until the socket closes.
/// 3. On close, announce the departure (if joined) and drop the connection.
pub async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let id = state.connect(tx).await;
    tracing::info!(conn = id, "connection accepted");

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn = id, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => handle_text(id, text.as_str(), &reader_state).await,
                Message::Close(_) => {
                    tracing::info!(conn = id, "received close frame");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.disconnect(id).await;
    tracing::info!(conn = id, "connection closed");
}

/// Route one text payload from connection `id`.
async fn handle_text(id: ConnId, text: &str, state: &ServerState) {
    let frame = match codec::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            if serde_json::from_str::<serde_json::Value>(text).is_err() {
                tracing::warn!(conn = id, "malformed payload");
                let reply = serde_json::json!({"type": "error", "text": MALFORMED_REPLY});
                if let Some(client) = state.clients.read().await.get(&id) {
                    let _ = client.tx.send(Message::Text(reply.to_string().into()));
                }
            } else {
                tracing::warn!(conn = id, error = %e, "ignoring unrecognized frame");
            }
            return;
        }
    };

    let frame = match frame {
        Frame::Join { user } => {
            let user = user.trim().to_string();
            if user.is_empty() {
                tracing::warn!(conn = id, "join with empty name");
            } else {
                state.join(id, user).await;
            }
            return;
        }
        other => other,
    };

    // Everything else must come from the name this connection joined with.
    let Some(joined_as) = state.user_of(id).await else {
        tracing::warn!(conn = id, kind = %frame.kind(), "frame before join");
        return;
    };
    if frame.user() != Some(joined_as.as_str()) {
        tracing::warn!(
            conn = id,
            joined_as = %joined_as,
            claimed = frame.user().unwrap_or_default(),
            "frame claims another identity"
        );
        return;
    }

    match frame {
        Frame::JoinRoom { user, room } => {
            if room.trim().is_empty() {
                tracing::warn!(conn = id, "join_room with empty room");
                return;
            }
            state.enter_room(id, &user, &room).await;
        }
        Frame::Chat {
            user, text, room, ..
        } => {
            if text.trim().is_empty() {
                return;
            }
            let outbound = Frame::Chat {
                user,
                text,
                room: room.clone(),
                timestamp: None,
            };
            let scope = room.as_deref().map_or(Scope::Everyone, Scope::Room);
            state.broadcast(scope, &outbound).await;
        }
        Frame::GetRooms { .. } => {
            let rooms = state.rooms.list().await;
            state.send_to(id, &Frame::RoomList { rooms }).await;
        }
        Frame::Leave { .. } => state.depart(id).await,
        other => {
            tracing::warn!(conn = id, kind = %other.kind(), "ignoring server-only frame from client");
        }
    }
}

/// Axum handler that upgrades HTTP to WebSocket.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Starts the server on the given address with fresh state.
///
/// Returns the bound address (useful when binding port 0) and the server
/// task handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(ServerState::new())).await
}

/// Starts the server with a caller-owned [`ServerState`], so tests can
/// inspect it.
///
/// The WebSocket endpoint is served at `/`, so `ws://host:port` works.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<ServerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}
