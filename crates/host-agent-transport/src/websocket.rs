//! WebSocket server holding the single authenticated controller connection.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;

/// Header carrying the shared secret.
pub const SECRET_HEADER: &str = "x-agent-secret";

/// Query parameter accepted when a proxy strips the header.
pub const SECRET_QUERY: &str = "secret";

/// Transport error.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Connection closed")]
    Closed,
}

/// Consumer of inbound frames.
///
/// Called from the connection read loop, one frame at a time; long work
/// should be spawned rather than awaited.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn handle_frame(&self, frame: Bytes);
}

struct ActiveConnection {
    id: u64,
    outbound: mpsc::UnboundedSender<Message>,
    // dropping this stops the connection's read loop
    _shutdown: oneshot::Sender<()>,
}

/// Owner of the active controller connection.
///
/// At most one connection is live; a newly authenticated connection always
/// replaces (and closes) the previous one.
pub struct TransportServer {
    secret: String,
    active: Mutex<Option<ActiveConnection>>,
    next_id: AtomicU64,
}

impl TransportServer {
    /// Create a server accepting connections that present `secret`.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Check the credential from the header, falling back to the query.
    #[must_use]
    pub fn authorize(&self, header: Option<&str>, query: Option<&str>) -> bool {
        header.unwrap_or_default() == self.secret || query.unwrap_or_default() == self.secret
    }

    /// Whether a controller is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Serialize `value` and queue it as one text frame on the active connection.
    ///
    /// # Errors
    /// Returns [`TransportError::NotConnected`] if no controller is connected.
    pub fn send<T: Serialize>(&self, value: &T) -> Result<(), TransportError> {
        let json = serde_json::to_string(value)?;
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = active.as_ref().ok_or(TransportError::NotConnected)?;
        conn.outbound
            .send(Message::Text(json.into()))
            .map_err(|_| TransportError::Closed)
    }

    /// Create the axum router serving `/ws`.
    #[must_use]
    pub fn router(self: &Arc<Self>, handler: Arc<dyn FrameHandler>) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(WsState {
                server: Arc::clone(self),
                handler,
            })
    }

    fn install(&self, outbound: mpsc::UnboundedSender<Message>, shutdown: oneshot::Sender<()>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(ActiveConnection {
                id,
                outbound,
                _shutdown: shutdown,
            });
        if let Some(previous) = previous {
            tracing::info!(old = previous.id, new = id, "Replacing active connection");
            let _ = previous.outbound.send(Message::Close(None));
        }
        id
    }

    fn release(&self, id: u64) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|conn| conn.id == id) {
            *active = None;
            true
        } else {
            false
        }
    }
}

#[derive(Clone)]
struct WsState {
    server: Arc<TransportServer>,
    handler: Arc<dyn FrameHandler>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthQuery {
    secret: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    State(state): State<WsState>,
) -> Response {
    let header = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if !state.server.authorize(header, query.secret.as_deref()) {
        tracing::warn!("Rejected connection with invalid secret");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();

    // Channel for sending messages to the controller
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let id = state.server.install(tx, shutdown_tx);
    tracing::info!(connection = id, "Controller connected");

    // Writer drains until every sender is gone or a close frame went out
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = sender.send(msg).await {
                tracing::debug!(connection = id, "WebSocket write failed: {e}");
                break;
            }
            if closing {
                break;
            }
        }
        let _ = sender.close().await;
    });

    loop {
        let next = tokio::select! {
            _ = &mut shutdown_rx => {
                tracing::info!(connection = id, "Connection superseded");
                break;
            }
            next = receiver.next() => next,
        };

        let frame = match next {
            Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_str().as_bytes()),
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(connection = id, "WebSocket read error: {e}");
                break;
            }
        };
        state.handler.handle_frame(frame).await;
    }

    state.server.release(id);
    tracing::info!(connection = id, "Controller disconnected");
}
