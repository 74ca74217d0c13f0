//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: upstream frames received, malformed and error frames
//! - **Fan-out**: updates broadcast, deliveries and evictions per pool
//! - **State**: upstream connection, subscribers per pool, cache size
//! - **Latency**: frame processing time from decode to broadcast
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Panics
///
/// Panics if another global recorder was installed first.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "ais_proxy_frames_received_total",
        "Total frames received from the upstream feed, by message type"
    );
    describe_counter!(
        "ais_proxy_frames_malformed_total",
        "Total upstream frames that could not be decoded"
    );
    describe_counter!(
        "ais_proxy_upstream_errors_total",
        "Total error notices sent by the upstream feed"
    );

    describe_counter!(
        "ais_proxy_updates_broadcast_total",
        "Total vessel updates broadcast, by pool"
    );
    describe_counter!(
        "ais_proxy_deliveries_total",
        "Total successful deliveries to subscribers, by pool"
    );
    describe_counter!(
        "ais_proxy_evictions_total",
        "Total subscribers evicted after a failed delivery, by pool"
    );

    describe_gauge!(
        "ais_proxy_upstream_connected",
        "1 while the upstream feed is streaming, else 0"
    );
    describe_gauge!("ais_proxy_subscribers", "Active subscribers, by pool");
    describe_gauge!(
        "ais_proxy_static_cache_entries",
        "Vessels with cached static attributes"
    );

    describe_counter!(
        "ais_proxy_reconnects_total",
        "Total upstream reconnection attempts"
    );

    describe_histogram!(
        "ais_proxy_frame_processing_seconds",
        "Time from frame decode to the end of the broadcast pass"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for subscriber pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    /// `/ws/ais-stream` connections.
    AisStream,
    /// `/ws/vessels` connections fed through the bridge.
    Vessels,
}

impl Pool {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AisStream => "ais_stream",
            Self::Vessels => "vessels",
        }
    }
}

/// Metric labels for upstream message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Position report.
    PositionReport,
    /// Static and voyage data.
    ShipStaticData,
    /// Upstream error notice.
    Error,
    /// Any other message type.
    Other,
}

impl MessageType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::PositionReport => "position_report",
            Self::ShipStaticData => "ship_static_data",
            Self::Error => "error",
            Self::Other => "other",
        }
    }
}

/// Record a frame received from the upstream.
pub fn record_frame_received(msg_type: MessageType) {
    counter!(
        "ais_proxy_frames_received_total",
        "message_type" => msg_type.as_str()
    )
    .increment(1);
}

/// Record a frame that failed to decode.
pub fn record_frame_malformed() {
    counter!("ais_proxy_frames_malformed_total").increment(1);
}

/// Record an upstream error notice.
pub fn record_upstream_error() {
    counter!("ais_proxy_upstream_errors_total").increment(1);
}

/// Record one broadcast pass and its deliveries.
pub fn record_broadcast(pool: Pool, delivered: u64) {
    counter!("ais_proxy_updates_broadcast_total", "pool" => pool.as_str()).increment(1);
    counter!("ais_proxy_deliveries_total", "pool" => pool.as_str()).increment(delivered);
}

/// Record evicted subscribers.
pub fn record_evictions(pool: Pool, count: u64) {
    counter!("ais_proxy_evictions_total", "pool" => pool.as_str()).increment(count);
}

/// Update the subscriber count for a pool.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribers(pool: Pool, count: usize) {
    gauge!("ais_proxy_subscribers", "pool" => pool.as_str()).set(count as f64);
}

/// Update the static cache size.
#[allow(clippy::cast_precision_loss)]
pub fn set_cache_entries(count: usize) {
    gauge!("ais_proxy_static_cache_entries").set(count as f64);
}

/// Update the upstream connection flag.
pub fn set_upstream_connected(connected: bool) {
    gauge!("ais_proxy_upstream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect() {
    counter!("ais_proxy_reconnects_total").increment(1);
}

/// Record frame processing duration.
pub fn record_processing_duration(duration: Duration) {
    histogram!("ais_proxy_frame_processing_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_as_str() {
        assert_eq!(Pool::AisStream.as_str(), "ais_stream");
        assert_eq!(Pool::Vessels.as_str(), "vessels");
    }

    #[test]
    fn message_type_as_str() {
        assert_eq!(MessageType::PositionReport.as_str(), "position_report");
        assert_eq!(MessageType::ShipStaticData.as_str(), "ship_static_data");
        assert_eq!(MessageType::Error.as_str(), "error");
        assert_eq!(MessageType::Other.as_str(), "other");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_received(MessageType::PositionReport);
        record_broadcast(Pool::AisStream, 3);
        set_subscribers(Pool::Vessels, 2);
        record_processing_duration(Duration::from_millis(1));
    }
}
