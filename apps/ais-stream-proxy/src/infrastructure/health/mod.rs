//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, upstream status reporting, and Prometheus
//! metrics. Used by container orchestrators, load balancers, and monitoring
//! systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (upstream streaming)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::static_data::StaticDataCache;
use crate::infrastructure::aisstream::{ConnectionState, FeedState};
use crate::infrastructure::broadcast::SharedRegistry;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Proxy version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream feed status.
    pub upstream: UpstreamInfo,
    /// Subscriber pools.
    pub pools: Vec<PoolInfo>,
    /// Static-data cache size.
    pub static_cache_entries: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Upstream streaming.
    Healthy,
    /// Upstream connecting or subscribed but not yet streaming.
    Degraded,
    /// Upstream stopped.
    Unhealthy,
}

/// Upstream feed status.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamInfo {
    /// Connection state.
    pub state: ConnectionState,
    /// Whether frames are flowing.
    pub connected: bool,
    /// Frames received count.
    pub messages_received: u64,
    /// Malformed frames discarded.
    pub malformed_frames: u64,
    /// Reconnect attempts since the last successful stream.
    pub reconnect_attempts: u32,
    /// Time the feed last started streaming.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent connection or upstream error.
    pub last_error: Option<String>,
}

/// Subscriber pool status.
#[derive(Debug, Clone, Serialize)]
pub struct PoolInfo {
    /// Pool name.
    pub name: &'static str,
    /// Registered subscribers.
    pub subscribers: usize,
    /// Subscribers with a region filter.
    pub filtered_subscribers: usize,
    /// Updates broadcast to this pool.
    pub updates_broadcast: u64,
    /// Evicted subscribers.
    pub evictions: u64,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    feed: Arc<FeedState>,
    pools: Vec<SharedRegistry>,
    cache: Arc<StaticDataCache>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        feed: Arc<FeedState>,
        pools: Vec<SharedRegistry>,
        cache: Arc<StaticDataCache>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            feed,
            pools,
            cache,
        }
    }
}

/// Build the health router.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.feed.get_state() == ConnectionState::Streaming {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let upstream = feed_state_to_info(&state.feed);
    let pools = state
        .pools
        .iter()
        .map(|registry| {
            let stats = registry.stats();
            PoolInfo {
                name: stats.pool.as_str(),
                subscribers: stats.subscribers,
                filtered_subscribers: stats.filtered_subscribers,
                updates_broadcast: stats.updates_broadcast,
                evictions: stats.evictions,
            }
        })
        .collect();

    HealthResponse {
        status: determine_health_status(upstream.state),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        upstream,
        pools,
        static_cache_entries: state.cache.len(),
    }
}

fn feed_state_to_info(feed: &FeedState) -> UpstreamInfo {
    let state = feed.get_state();
    UpstreamInfo {
        state,
        connected: state == ConnectionState::Streaming,
        messages_received: feed.get_messages_received(),
        malformed_frames: feed.get_malformed_frames(),
        reconnect_attempts: feed.get_reconnect_attempts(),
        last_connected_at: feed.last_connected_at(),
        last_error: feed.last_error(),
    }
}

const fn determine_health_status(state: ConnectionState) -> HealthStatus {
    match state {
        ConnectionState::Streaming => HealthStatus::Healthy,
        ConnectionState::Connecting | ConnectionState::Subscribed => HealthStatus::Degraded,
        ConnectionState::Stopped => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
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

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::infrastructure::broadcast::SubscriptionRegistry;
    use crate::infrastructure::metrics::Pool;

    fn state_with(feed: Arc<FeedState>) -> Arc<HealthServerState> {
        Arc::new(HealthServerState::new(
            "0.1.0".to_string(),
            feed,
            vec![
                Arc::new(SubscriptionRegistry::new(Pool::AisStream)),
                Arc::new(SubscriptionRegistry::new(Pool::Vessels)),
            ],
            Arc::new(StaticDataCache::new()),
        ))
    }

    async fn get(state: Arc<HealthServerState>, uri: &str) -> (StatusCode, String) {
        let response = router(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_connection_state() {
        assert_eq!(
            determine_health_status(ConnectionState::Streaming),
            HealthStatus::Healthy
        );
        assert_eq!(
            determine_health_status(ConnectionState::Subscribed),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(ConnectionState::Connecting),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(ConnectionState::Stopped),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (status, body) = get(state_with(Arc::new(FeedState::new())), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn readiness_requires_streaming() {
        let feed = Arc::new(FeedState::new());
        let state = state_with(Arc::clone(&feed));

        let (status, _) = get(Arc::clone(&state), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        feed.set_state(ConnectionState::Subscribed);
        let (status, _) = get(Arc::clone(&state), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        feed.mark_streaming();
        let (status, body) = get(state, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "READY");
    }

    #[tokio::test]
    async fn health_reports_pools_and_upstream() {
        let feed = Arc::new(FeedState::new());
        feed.mark_streaming();
        feed.increment_messages();

        let (status, body) = get(state_with(feed), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["upstream"]["state"], "streaming");
        assert_eq!(json["upstream"]["messages_received"], 1);
        assert_eq!(json["pools"][0]["name"], "ais_stream");
        assert_eq!(json["pools"][1]["name"], "vessels");
        assert_eq!(json["static_cache_entries"], 0);
    }

    #[tokio::test]
    async fn stopped_upstream_is_unavailable() {
        let (status, body) = get(state_with(Arc::new(FeedState::new())), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("\"unhealthy\""));
    }
}
