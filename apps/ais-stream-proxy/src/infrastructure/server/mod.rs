//! Downstream WebSocket Server
//!
//! Serves the JSON fan-out protocol on two pools:
//!
//! - `GET /ws/ais-stream` - primary pool, fed directly by the upstream client
//! - `GET /ws/vessels[?bbox=minLat,minLon,maxLat,maxLon]` - second pool, fed
//!   through the external-sink bridge
//!
//! # Protocol
//!
//! Client to server:
//!
//! ```json
//! {"type": "subscribe", "bbox": "40,27,42,30"}
//! {"type": "unsubscribe"}
//! {"type": "ping"}
//! ```
//!
//! Server to client: `connection`, `vessel_update`, `vessels_update`,
//! `subscribed`, `unsubscribed`, `pong` and `error`.
//!
//! Each connection registers a `ChannelSink` with its pool. A writer task
//! drains replies first and then batches queued updates; when several updates
//! are waiting they are sent as one `vessels_update`. When the registry evicts
//! the subscriber its queue closes and the writer ends the connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::region::BoundingBox;
use crate::domain::vessel::VesselUpdate;
use crate::infrastructure::broadcast::{ChannelSink, SharedRegistry, SubscriberId};

/// Greeting sent once on accept.
pub const CONNECTION_MESSAGE: &str = "Connected to Vessel Tracker";

/// Default per-connection update queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default maximum updates per `vessels_update`.
pub const DEFAULT_BATCH_MAX: usize = 64;

const CONTROL_QUEUE_CAPACITY: usize = 32;

/// How long a closing connection may take to flush its Close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Wire Messages
// =============================================================================

/// Commands accepted from downstream clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Set the region filter; no bbox means the global feed.
    Subscribe {
        /// `"minLat,minLon,maxLat,maxLon"`.
        #[serde(default)]
        bbox: Option<String>,
    },
    /// Clear the region filter.
    Unsubscribe,
    /// Keepalive.
    Ping,
}

/// Messages pushed to downstream clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting.
    Connection {
        /// Greeting text.
        message: String,
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// A single vessel update.
    VesselUpdate {
        /// The update.
        vessel: Arc<VesselUpdate>,
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// Several queued vessel updates.
    VesselsUpdate {
        /// The updates, in broadcast order.
        vessels: Vec<Arc<VesselUpdate>>,
        /// Number of updates.
        count: usize,
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// Keepalive reply.
    Pong,
    /// Filter acknowledgement.
    Subscribed {
        /// Active filter, absent for the global feed.
        bbox: Option<String>,
        /// Human-readable summary.
        message: String,
    },
    /// Filter cleared.
    Unsubscribed {
        /// Human-readable summary.
        message: String,
    },
    /// Rejected command.
    Error {
        /// Reason.
        message: String,
        /// Server time.
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Wrap queued updates; one update is sent as `vessel_update`.
    fn from_batch(batch: Vec<Arc<VesselUpdate>>) -> Self {
        let timestamp = Utc::now();
        match <[Arc<VesselUpdate>; 1]>::try_from(batch) {
            Ok([vessel]) => Self::VesselUpdate { vessel, timestamp },
            Err(vessels) => Self::VesselsUpdate {
                count: vessels.len(),
                vessels,
                timestamp,
            },
        }
    }
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the WebSocket routes.
#[derive(Clone)]
pub struct ServerState {
    primary: SharedRegistry,
    vessels: SharedRegistry,
    queue_capacity: usize,
    batch_max: usize,
    cancel: CancellationToken,
}

impl ServerState {
    /// Create server state over the two pools.
    #[must_use]
    pub fn new(primary: SharedRegistry, vessels: SharedRegistry, cancel: CancellationToken) -> Self {
        Self {
            primary,
            vessels,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_max: DEFAULT_BATCH_MAX,
            cancel,
        }
    }

    /// Override the per-connection queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Override the maximum batch size.
    #[must_use]
    pub fn with_batch_max(mut self, batch_max: usize) -> Self {
        self.batch_max = batch_max.max(1);
        self
    }
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("primary", &self.primary.subscriber_count())
            .field("vessels", &self.vessels.subscriber_count())
            .field("queue_capacity", &self.queue_capacity)
            .field("batch_max", &self.batch_max)
            .finish_non_exhaustive()
    }
}

/// Build the WebSocket router.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/ws/ais-stream", get(ais_stream_handler))
        .route("/ws/vessels", get(vessels_handler))
        .with_state(state)
}

// =============================================================================
// Server
// =============================================================================

/// Downstream WebSocket server.
#[derive(Debug)]
pub struct WebSocketServer {
    port: u16,
    state: ServerState,
}

impl WebSocketServer {
    /// Create a new server. Shutdown follows the state's cancellation token.
    #[must_use]
    pub const fn new(port: u16, state: ServerState) -> Self {
        Self { port, state }
    }

    /// Run until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `WebSocketServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), WebSocketServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WebSocketServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "WebSocket server listening");
        serve(listener, self.state).await
    }
}

/// Serve on an already-bound listener until the state's token is cancelled.
///
/// # Errors
///
/// Returns `WebSocketServerError::ServerFailed` on a fatal server error.
pub async fn serve(listener: TcpListener, state: ServerState) -> Result<(), WebSocketServerError> {
    let cancel = state.cancel.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| WebSocketServerError::ServerFailed(e.to_string()))?;

    tracing::info!("WebSocket server stopped");
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
struct BboxQuery {
    bbox: Option<String>,
}

async fn ais_stream_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    let registry = Arc::clone(&state.primary);
    ws.on_upgrade(move |socket| handle_socket(socket, registry, None, state))
}

async fn vessels_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<BboxQuery>,
    State(state): State<ServerState>,
) -> Response {
    let filter = match query.bbox.as_deref().map(str::parse::<BoundingBox>) {
        None => None,
        Some(Ok(bbox)) => Some(bbox),
        Some(Err(e)) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let registry = Arc::clone(&state.vessels);
    ws.on_upgrade(move |socket| handle_socket(socket, registry, filter, state))
}

async fn handle_socket(
    socket: WebSocket,
    registry: SharedRegistry,
    filter: Option<BoundingBox>,
    state: ServerState,
) {
    let (sink, updates) = ChannelSink::new(state.queue_capacity);
    let id = registry.add_subscriber_with_filter(Arc::new(sink), filter);
    tracing::info!(
        subscriber_id = %id,
        pool = registry.pool().as_str(),
        bbox = ?filter,
        "Client connected"
    );

    let (ws_tx, mut ws_rx) = socket.split();
    let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
    let _ = control_tx.try_send(ServerMessage::Connection {
        message: CONNECTION_MESSAGE.to_string(),
        timestamp: Utc::now(),
    });

    let mut writer = tokio::spawn(write_loop(ws_tx, control_rx, updates, state.batch_max));
    let mut writer_done = false;

    loop {
        tokio::select! {
            () = state.cancel.cancelled() => break,
            _ = &mut writer => {
                writer_done = true;
                break;
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_command(text.as_str(), &registry, id);
                        if control_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(subscriber_id = %id, error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
        }
    }

    // Dropping the control queue ends the writer, which sends Close.
    registry.remove_subscriber(id);
    drop(control_tx);
    if !writer_done && tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await.is_err() {
        tracing::debug!(subscriber_id = %id, "Writer did not close in time");
        writer.abort();
    }
    tracing::info!(subscriber_id = %id, pool = registry.pool().as_str(), "Client disconnected");
}

/// Apply one client command and build its reply.
fn handle_command(text: &str, registry: &SharedRegistry, id: SubscriberId) -> ServerMessage {
    let command = match serde_json::from_str::<ClientMessage>(text) {
        Ok(command) => command,
        Err(e) => return ServerMessage::error(format!("invalid message: {e}")),
    };

    match command {
        ClientMessage::Subscribe { bbox: None } => {
            registry.set_filter(id, None);
            ServerMessage::Subscribed {
                bbox: None,
                message: "Subscribed to global feed".to_string(),
            }
        }
        ClientMessage::Subscribe { bbox: Some(raw) } => match raw.parse::<BoundingBox>() {
            Ok(bbox) => {
                registry.set_filter(id, Some(bbox));
                tracing::debug!(subscriber_id = %id, bbox = %bbox, "Filter set");
                ServerMessage::Subscribed {
                    bbox: Some(bbox.to_string()),
                    message: format!("Subscribed to bbox: {bbox}"),
                }
            }
            Err(e) => ServerMessage::error(format!("invalid bbox: {e}")),
        },
        ClientMessage::Unsubscribe => {
            registry.set_filter(id, None);
            ServerMessage::Unsubscribed {
                message: "Unsubscribed from updates".to_string(),
            }
        }
        ClientMessage::Ping => ServerMessage::Pong,
    }
}

/// Push replies and batched updates until either queue closes or a send fails.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut control: mpsc::Receiver<ServerMessage>,
    mut updates: mpsc::Receiver<Arc<VesselUpdate>>,
    batch_max: usize,
) {
    let mut batch = Vec::with_capacity(batch_max);

    loop {
        let message = tokio::select! {
            biased;
            reply = control.recv() => match reply {
                Some(reply) => reply,
                None => break,
            },
            received = updates.recv_many(&mut batch, batch_max) => {
                if received == 0 {
                    // Registry dropped the sink: evicted or removed.
                    break;
                }
                ServerMessage::from_batch(std::mem::take(&mut batch))
            }
        };

        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize server message");
                continue;
            }
        };
        if ws_tx.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }

    let _ = ws_tx.send(Message::Close(None)).await;
}

// =============================================================================
// Errors
// =============================================================================

/// WebSocket server errors.
#[derive(Debug, thiserror::Error)]
pub enum WebSocketServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
