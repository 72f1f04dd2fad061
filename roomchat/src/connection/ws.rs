//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Each connection runs in its own tokio task. The task connects (under a
//! timeout), then multiplexes the outbound queue and the socket reader with
//! `select!` until the socket is gone, and finally reports `Closed`.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use super::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, CLOSE_NORMAL, ConnectionId, Connector, EventSender, Link, Outbound,
    TransportError, TransportEvent, TransportEventKind,
};

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for the server to answer our close frame.
const CLOSE_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Connector that opens real WebSocket connections.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    /// Create a connector with the given handshake timeout.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl Connector for WsConnector {
    fn connect(&self, endpoint: &str, id: ConnectionId, events: EventSender) -> Link {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(
            endpoint.to_string(),
            self.connect_timeout,
            outbound_rx,
            Reporter { id, events },
        ));
        Link::new(outbound_tx, Some(task))
    }
}

struct Reporter {
    id: ConnectionId,
    events: EventSender,
}

impl Reporter {
    fn emit(&self, kind: TransportEventKind) {
        // The session may already be gone; nothing left to tell.
        let _ = self.events.send(TransportEvent {
            connection: self.id,
            kind,
        });
    }

    fn fail(&self, err: &TransportError) {
        self.emit(TransportEventKind::Error(err.to_string()));
        self.emit(TransportEventKind::Closed {
            code: CLOSE_ABNORMAL,
            was_clean: false,
        });
    }
}

async fn run_connection(
    endpoint: String,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    reporter: Reporter,
) {
    let connected =
        tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(endpoint.as_str()))
            .await;
    let ws_stream = match connected {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            let err = map_ws_connect_error(e, &endpoint);
            tracing::warn!(connection = %reporter.id, err = %err, "websocket connect failed");
            reporter.fail(&err);
            return;
        }
        Err(_) => {
            tracing::warn!(connection = %reporter.id, endpoint, "websocket connect timed out");
            reporter.fail(&TransportError::Timeout);
            return;
        }
    };

    tracing::debug!(connection = %reporter.id, endpoint, "websocket handshake complete");
    reporter.emit(TransportEventKind::Opened);

    let (mut ws_sender, mut ws_reader) = ws_stream.split();
    let mut remote_close: Option<u16> = None;
    let mut local_close: Option<u16> = None;
    let mut close_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            incoming = ws_reader.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    reporter.emit(TransportEventKind::Text(text.as_str().to_string()));
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => reporter.emit(TransportEventKind::Text(text)),
                    Err(_) => reporter.emit(TransportEventKind::Error(
                        "received binary payload that is not UTF-8".to_string(),
                    )),
                },
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map_or(CLOSE_NO_STATUS, |f| u16::from(f.code));
                    if local_close.is_none() {
                        reporter.emit(TransportEventKind::CloseRequested { code });
                    }
                    remote_close = Some(code);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    if remote_close.is_none() && local_close.is_none() {
                        tracing::warn!(connection = %reporter.id, err = %e, "websocket read error");
                        reporter.fail(&TransportError::WebSocket(e.to_string()));
                        return;
                    }
                    break;
                }
                None => break,
            },
            cmd = outbound.recv(), if local_close.is_none() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!(connection = %reporter.id, err = %e, "websocket write failed");
                        reporter.emit(TransportEventKind::Error(format!("send failed: {e}")));
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    local_close = Some(code);
                    close_deadline = Some(Instant::now() + CLOSE_ACK_TIMEOUT);
                    if let Err(e) = ws_sender.send(Message::Close(Some(frame))).await {
                        tracing::debug!(connection = %reporter.id, err = %e, "close frame not sent");
                        break;
                    }
                }
                None => {
                    // Link dropped without an explicit close.
                    local_close = Some(CLOSE_NORMAL);
                    close_deadline = Some(Instant::now() + CLOSE_ACK_TIMEOUT);
                    if ws_sender.send(Message::Close(None)).await.is_err() {
                        break;
                    }
                }
            },
            () = tokio::time::sleep_until(close_deadline.unwrap_or_else(Instant::now)),
                if close_deadline.is_some() => {
                tracing::debug!(connection = %reporter.id, "server did not acknowledge close");
                reporter.emit(TransportEventKind::Closed {
                    code: CLOSE_ABNORMAL,
                    was_clean: false,
                });
                return;
            }
        }
    }

    let kind = match remote_close.or(local_close) {
        Some(code) => TransportEventKind::Closed {
            code,
            was_clean: true,
        },
        None => TransportEventKind::Closed {
            code: CLOSE_ABNORMAL,
            was_clean: false,
        },
    };
    tracing::debug!(connection = %reporter.id, ?kind, "websocket task finished");
    reporter.emit(kind);
}

/// Map a `tokio_tungstenite` connection error to a [`TransportError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error, endpoint: &str) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                TransportError::Unreachable(endpoint.to_string())
            } else {
                TransportError::WebSocket(io_err.to_string())
            }
        }
        WsError::Tls(_) => TransportError::WebSocket(format!("TLS error: {err}")),
        WsError::Http(response) => {
            TransportError::WebSocket(format!("HTTP error: status {}", response.status()))
        }
        other => TransportError::WebSocket(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite as ws;

    type ServerStream = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Accept one connection and hand it to `script`.
    async fn one_shot_server<F, Fut>(script: F) -> String
    where
        F: FnOnce(ServerStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws_stream = tokio_tungstenite::accept_async(stream).await.unwrap();
            script(ws_stream).await;
        });
        format!("ws://{addr}")
    }

    async fn next_kind(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEventKind {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
            .kind
    }

    #[tokio::test]
    async fn unreachable_server_reports_error_then_abnormal_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new();
        let _link = WsConnector::new(Duration::from_secs(2)).connect("ws://127.0.0.1:1", id, tx);

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.connection, id);
        assert!(matches!(first.kind, TransportEventKind::Error(_)));
        assert_eq!(
            next_kind(&mut rx).await,
            TransportEventKind::Closed {
                code: CLOSE_ABNORMAL,
                was_clean: false
            }
        );
    }

    #[tokio::test]
    async fn text_flows_both_ways() {
        let url = one_shot_server(|mut ws_stream| async move {
            ws_stream
                .send(ws::Message::Text("first".into()))
                .await
                .unwrap();
            // Echo whatever the client sends, then wait for it to close.
            while let Some(Ok(msg)) = ws_stream.next().await {
                if msg.is_text() {
                    ws_stream.send(msg).await.unwrap();
                }
            }
        })
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = WsConnector::default().connect(&url, ConnectionId::new(), tx);

        assert_eq!(next_kind(&mut rx).await, TransportEventKind::Opened);
        assert_eq!(
            next_kind(&mut rx).await,
            TransportEventKind::Text("first".into())
        );

        link.send_text("ping".into()).unwrap();
        assert_eq!(
            next_kind(&mut rx).await,
            TransportEventKind::Text("ping".into())
        );
    }

    #[tokio::test]
    async fn binary_utf8_payload_is_delivered_as_text() {
        let url = one_shot_server(|mut ws_stream| async move {
            ws_stream
                .send(ws::Message::Binary(b"hello".to_vec().into()))
                .await
                .unwrap();
            ws_stream
                .send(ws::Message::Binary(vec![0xff, 0xfe].into()))
                .await
                .unwrap();
            while ws_stream.next().await.is_some() {}
        })
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _link = WsConnector::default().connect(&url, ConnectionId::new(), tx);

        assert_eq!(next_kind(&mut rx).await, TransportEventKind::Opened);
        assert_eq!(
            next_kind(&mut rx).await,
            TransportEventKind::Text("hello".into())
        );
        assert!(matches!(
            next_kind(&mut rx).await,
            TransportEventKind::Error(_)
        ));
    }

    #[tokio::test]
    async fn server_close_is_clean_with_its_code() {
        let url = one_shot_server(|mut ws_stream| async move {
            let frame = CloseFrame {
                code: CloseCode::Away,
                reason: "shutting down".into(),
            };
            let _ = ws_stream.close(Some(frame)).await;
            while ws_stream.next().await.is_some() {}
        })
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _link = WsConnector::default().connect(&url, ConnectionId::new(), tx);

        assert_eq!(next_kind(&mut rx).await, TransportEventKind::Opened);
        assert_eq!(
            next_kind(&mut rx).await,
            TransportEventKind::CloseRequested { code: 1001 }
        );
        assert_eq!(
            next_kind(&mut rx).await,
            TransportEventKind::Closed {
                code: 1001,
                was_clean: true
            }
        );
    }

    #[tokio::test]
    async fn local_close_sends_close_frame_with_code() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let url = one_shot_server(|mut ws_stream| async move {
            let mut close_code = None;
            while let Some(Ok(msg)) = ws_stream.next().await {
                if let ws::Message::Close(Some(frame)) = msg {
                    close_code = Some(u16::from(frame.code));
                }
            }
            let _ = seen_tx.send(close_code);
        })
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut link = WsConnector::default().connect(&url, ConnectionId::new(), tx);
        assert_eq!(next_kind(&mut rx).await, TransportEventKind::Opened);

        link.close(1000, "bye").unwrap();
        assert_eq!(
            next_kind(&mut rx).await,
            TransportEventKind::Closed {
                code: 1000,
                was_clean: true
            }
        );
        assert_eq!(seen_rx.await.unwrap(), Some(1000));

        let task = link.take_task().unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
