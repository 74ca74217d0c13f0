//! AIS Stream Proxy Binary
//!
//! Starts the vessel feed proxy.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ais-stream-proxy
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `AISSTREAM_API_KEY`: AISStream.io API key
//!
//! ## Optional
//! - `AISSTREAM_URL`: Upstream endpoint (default: <wss://stream.aisstream.io/v0/stream>)
//! - `AIS_BOUNDING_BOXES`: `;`-separated `minLat,minLon,maxLat,maxLon` boxes (default: globe)
//! - `AIS_MMSI_FILTER`: Comma-separated MMSI allow-list (default: none)
//! - `AIS_PROXY_RECONNECT_DELAY_SECS`: Fixed reconnect delay (default: 5)
//! - `AIS_PROXY_HEARTBEAT_INTERVAL_SECS`: Upstream ping interval (default: 30)
//! - `AIS_PROXY_HEARTBEAT_TIMEOUT_SECS`: Silence after a ping before reconnecting (default: 30)
//! - `AIS_PROXY_WS_PORT`: Downstream WebSocket port (default: 5000)
//! - `AIS_PROXY_HEALTH_PORT`: Health and metrics port (default: 8082)
//! - `AIS_PROXY_SUBSCRIBER_QUEUE`: Per-connection queue capacity (default: 1024)
//! - `AIS_PROXY_BATCH_MAX`: Maximum updates per `vessels_update` (default: 64)
//! - `AIS_PROXY_BRIDGE_CAPACITY`: `/ws/vessels` bridge capacity (default: 4096)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: ais-stream-proxy)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use ais_stream_proxy::infrastructure::health::{HealthServer, HealthServerState};
use ais_stream_proxy::infrastructure::metrics::Pool;
use ais_stream_proxy::infrastructure::server::{ServerState, WebSocketServer};
use ais_stream_proxy::infrastructure::telemetry;
use ais_stream_proxy::{ProxyConfig, ProxyController, SubscriptionRegistry, bridge_sink, init_metrics};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting AIS Stream Proxy");

    let _metrics_handle = init_metrics();

    let config = ProxyConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Primary pool is owned by the controller; the vessels pool hangs off
    // its external sink.
    let controller = Arc::new(ProxyController::new(config.to_stream_config()));
    let vessels_registry = Arc::new(SubscriptionRegistry::new(Pool::Vessels));
    let (external_sink, bridge_task) =
        bridge_sink(Arc::clone(&vessels_registry), config.fanout.bridge_capacity);
    controller.set_external_sink(external_sink);

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        controller.feed_state(),
        vec![controller.registry(), Arc::clone(&vessels_registry)],
        controller.cache(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    let server_state = ServerState::new(
        controller.registry(),
        Arc::clone(&vessels_registry),
        shutdown_token.clone(),
    )
    .with_queue_capacity(config.fanout.subscriber_queue)
    .with_batch_max(config.fanout.batch_max);
    let ws_server = WebSocketServer::new(config.server.ws_port, server_state);

    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let ws_task = tokio::spawn(async move {
        if let Err(e) = ws_server.run().await {
            tracing::error!(error = %e, "WebSocket server error");
        }
    });

    controller.start();

    tracing::info!("AIS stream proxy ready");

    await_shutdown(shutdown_token).await;

    controller.stop().await;
    controller.clear_external_sink();
    bridge_task.abort();
    join_with_timeout(vec![health_task, ws_task]).await;

    tracing::info!("AIS stream proxy stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ProxyConfig) {
    tracing::info!(
        url = %config.upstream.url,
        bounding_boxes = config.upstream.bounding_boxes.len(),
        mmsi_filter = config.upstream.mmsi_filter.len(),
        reconnect_delay_secs = config.upstream.reconnect_delay.as_secs(),
        ws_port = config.server.ws_port,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        subscriber_queue = config.fanout.subscriber_queue,
        batch_max = config.fanout.batch_max,
        bridge_capacity = config.fanout.bridge_capacity,
        "Fan-out settings"
    );
}

/// Wait for the server tasks to drain, bounded by `SHUTDOWN_TIMEOUT`.
async fn join_with_timeout(tasks: Vec<JoinHandle<()>>) {
    let joined = futures_util::future::join_all(tasks);
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, joined).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Servers did not stop in time"
        );
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
