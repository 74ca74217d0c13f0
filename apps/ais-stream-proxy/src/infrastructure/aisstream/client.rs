//! AISStream WebSocket Client
//!
//! Owns the single upstream connection to AISStream.io and drives every
//! received frame through the normalizer into the subscriber registry.
//!
//! # Stream URL
//!
//! `wss://stream.aisstream.io/v0/stream`
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ─► Connecting ─► Subscribed ─► Streaming
//!                ▲                           │ close / error / EOF
//!                └──── fixed delay ◄─────────┘
//! ```
//!
//! The subscription request is re-sent on every connect. Cancellation is
//! observed before each attempt, while connecting, between frames, and
//! during the reconnect delay; a broadcast pass already under way always
//! completes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::auth::Credentials;
use super::codec::{CodecError, FrameCodec};
use super::heartbeat::{Heartbeat, HeartbeatAction, HeartbeatConfig};
use super::messages::{AisFrame, SubscriptionRequest};
use super::normalizer::MessageNormalizer;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::region::BoundingBox;
use crate::domain::vessel::Mmsi;
use crate::infrastructure::broadcast::SharedRegistry;
use crate::infrastructure::metrics::{self, MessageType};

/// Production stream endpoint.
pub const AISSTREAM_URL: &str = "wss://stream.aisstream.io/v0/stream";

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one upstream connection. All of them lead to a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum AisStreamError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Subscription request could not be serialized.
    #[error("failed to serialize subscription: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Connection closed by the server or the stream ended.
    #[error("connection closed")]
    ConnectionClosed,

    /// Ping went unanswered and nothing else arrived.
    #[error("no frame from upstream for {0:?}")]
    HeartbeatTimeout(Duration),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the upstream client.
#[derive(Debug, Clone)]
pub struct AisStreamConfig {
    /// WebSocket URL.
    pub url: String,
    /// API credentials.
    pub credentials: Credentials,
    /// Upstream region restriction; empty means the whole globe.
    pub bounding_boxes: Vec<BoundingBox>,
    /// Identity allow-list; empty means every vessel.
    pub mmsi_filter: Vec<Mmsi>,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Liveness check configuration.
    pub heartbeat: HeartbeatConfig,
}

impl AisStreamConfig {
    /// Create a configuration for the production endpoint.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            url: AISSTREAM_URL.to_string(),
            credentials,
            bounding_boxes: Vec::new(),
            mmsi_filter: Vec::new(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// Override the endpoint URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Restrict the upstream subscription to these regions.
    #[must_use]
    pub fn with_bounding_boxes(mut self, boxes: Vec<BoundingBox>) -> Self {
        self.bounding_boxes = boxes;
        self
    }

    /// Restrict the upstream subscription to these identities.
    #[must_use]
    pub fn with_mmsi_filter(mut self, mmsi: Vec<Mmsi>) -> Self {
        self.mmsi_filter = mmsi;
        self
    }

    /// Override the reconnection policy.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Override the liveness check.
    #[must_use]
    pub const fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// The subscription request sent on every connect.
    #[must_use]
    pub fn subscription_request(&self) -> SubscriptionRequest {
        SubscriptionRequest::new(
            self.credentials.api_key(),
            &self.bounding_boxes,
            &self.mmsi_filter,
        )
    }
}

// =============================================================================
// Feed State
// =============================================================================

/// Upstream connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not running.
    #[default]
    Stopped,
    /// Opening the socket, or waiting to retry.
    Connecting,
    /// Subscription sent, no frame received yet.
    Subscribed,
    /// Frames are flowing.
    Streaming,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Streaming => "streaming",
        }
    }
}

/// Shared, lock-light view of the upstream connection for health reporting.
#[derive(Debug, Default)]
pub struct FeedState {
    state: parking_lot::RwLock<ConnectionState>,
    last_connected_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    last_error: parking_lot::RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    messages_received: AtomicU64,
    malformed_frames: AtomicU64,
}

impl FeedState {
    /// Create a stopped feed state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        metrics::set_upstream_connected(state == ConnectionState::Streaming);
        if state == ConnectionState::Streaming {
            *self.last_connected_at.write() = Some(Utc::now());
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// Enter `Streaming` unless already there.
    pub fn mark_streaming(&self) {
        if self.get_state() != ConnectionState::Streaming {
            self.set_state(ConnectionState::Streaming);
        }
    }

    /// Remember the most recent error.
    pub fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write() = Some(message.into());
    }

    /// Increment reconnect attempts.
    pub fn increment_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment messages received counter.
    pub fn increment_messages(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment malformed frame counter.
    pub fn increment_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current connection state.
    #[must_use]
    pub fn get_state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Get messages received count.
    #[must_use]
    pub fn get_messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Get malformed frame count.
    #[must_use]
    pub fn get_malformed_frames(&self) -> u64 {
        self.malformed_frames.load(Ordering::Relaxed)
    }

    /// Get reconnect attempts since the last healthy stream.
    #[must_use]
    pub fn get_reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// When the stream last became healthy.
    #[must_use]
    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        *self.last_connected_at.read()
    }

    /// Most recent error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }
}

// =============================================================================
// Client
// =============================================================================

/// Upstream client: connect, subscribe, stream, reconnect.
pub struct AisStreamClient {
    config: AisStreamConfig,
    codec: FrameCodec,
    normalizer: MessageNormalizer,
    registry: SharedRegistry,
    state: Arc<FeedState>,
}

impl AisStreamClient {
    /// Create a new client feeding `registry`.
    #[must_use]
    pub fn new(
        config: AisStreamConfig,
        normalizer: MessageNormalizer,
        registry: SharedRegistry,
        state: Arc<FeedState>,
    ) -> Self {
        Self {
            config,
            codec: FrameCodec::new(),
            normalizer,
            registry,
            state,
        }
    }

    /// Shared feed state.
    #[must_use]
    pub fn state(&self) -> Arc<FeedState> {
        Arc::clone(&self.state)
    }

    /// Run the connection loop until `cancel` fires.
    ///
    /// Connection losses are retried forever after the configured fixed
    /// delay.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.state.set_state(ConnectionState::Connecting);

            match self.connect_and_run(&cancel).await {
                Ok(()) => break,
                Err(e) => {
                    if self.state.get_state() == ConnectionState::Streaming {
                        reconnect_policy.reset();
                    }
                    tracing::warn!(error = %e, "AISStream connection lost");
                    self.state.record_error(e.to_string());
                    self.state.set_state(ConnectionState::Connecting);
                }
            }

            if cancel.is_cancelled() {
                break;
            }

            let delay = reconnect_policy.next_delay();
            self.state.increment_reconnect_attempts();
            metrics::record_reconnect();
            tracing::info!(
                attempt = reconnect_policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Reconnecting to AISStream"
            );

            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("AISStream client cancelled during reconnect delay");
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.state.set_state(ConnectionState::Stopped);
        tracing::info!("AISStream client stopped");
    }

    /// Connect, subscribe and stream until error or cancellation.
    ///
    /// Returns `Ok(())` only when cancelled.
    async fn connect_and_run(&self, cancel: &CancellationToken) -> Result<(), AisStreamError> {
        tracing::info!(url = %self.config.url, "Connecting to AISStream");

        let (ws_stream, _response) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(self.config.url.as_str()) => result?,
        };

        let (mut write, mut read) = ws_stream.split();

        let request = self.config.subscription_request();
        tracing::debug!(
            boxes = request.bounding_boxes.len(),
            mmsi_filter = request.filters_ship_mmsi.len(),
            "Sending subscription"
        );
        write.send(Message::Text(request.to_json()?.into())).await?;
        self.state.set_state(ConnectionState::Subscribed);
        tracing::info!("AISStream subscription sent");

        let mut heartbeat = Heartbeat::new(self.config.heartbeat);
        let mut ticker = tokio::time::interval(heartbeat.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!(error = %e, "Failed to send close frame");
                    }
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match heartbeat.on_tick() {
                        HeartbeatAction::SendPing => {
                            write.send(Message::Ping(Vec::new().into())).await?;
                        }
                        HeartbeatAction::TimedOut(silent_for) => {
                            tracing::warn!(
                                silent_ms = silent_for.as_millis(),
                                "AISStream heartbeat timeout"
                            );
                            return Err(AisStreamError::HeartbeatTimeout(silent_for));
                        }
                    }
                }
                msg = read.next() => {
                    if matches!(msg, Some(Ok(_))) {
                        heartbeat.record_activity();
                    }
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_payload(self.codec.decode(&text)).await;
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            self.handle_payload(self.codec.decode_binary(&bytes)).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Server sent close frame");
                            return Err(AisStreamError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Pong and raw frames
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(AisStreamError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Process one decoded (or undecodable) frame.
    async fn handle_payload(&self, decoded: Result<AisFrame, CodecError>) {
        let started = Instant::now();
        self.state.mark_streaming();
        self.state.increment_messages();

        let frame = match decoded {
            Ok(frame) => frame,
            Err(e) => {
                self.state.increment_malformed();
                metrics::record_frame_malformed();
                tracing::warn!(error = %e, "Discarding malformed frame");
                return;
            }
        };

        metrics::record_frame_received(message_type(&frame));

        match frame {
            AisFrame::Error(message) => {
                metrics::record_upstream_error();
                tracing::error!(message = %message, "AISStream error");
                self.state.record_error(message);
                return;
            }
            AisFrame::Unknown(kind) => {
                tracing::trace!(message_type = %kind, "Ignoring unhandled message type");
                return;
            }
            frame @ AisFrame::ShipStaticData { .. } => {
                let _ = self.normalizer.normalize(frame);
                metrics::set_cache_entries(self.normalizer.cache().len());
            }
            frame @ AisFrame::PositionReport { .. } => {
                if let Some(update) = self.normalizer.normalize(frame) {
                    self.registry.broadcast(Arc::new(update)).await;
                }
            }
        }

        metrics::record_processing_duration(started.elapsed());
    }
}

impl std::fmt::Debug for AisStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AisStreamClient")
            .field("config", &self.config)
            .field("state", &self.state.get_state())
            .finish_non_exhaustive()
    }
}

const fn message_type(frame: &AisFrame) -> MessageType {
    match frame {
        AisFrame::PositionReport { .. } => MessageType::PositionReport,
        AisFrame::ShipStaticData { .. } => MessageType::ShipStaticData,
        AisFrame::Error(_) => MessageType::Error,
        AisFrame::Unknown(_) => MessageType::Other,
    }
}
