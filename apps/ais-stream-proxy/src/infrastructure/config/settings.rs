//! Proxy Configuration Settings
//!
//! Configuration types for the vessel feed proxy, loaded from environment
//! variables. Only `AISSTREAM_API_KEY` is required.

use std::str::FromStr;
use std::time::Duration;

use crate::domain::region::BoundingBox;
use crate::domain::vessel::Mmsi;
use crate::infrastructure::aisstream::{
    AISSTREAM_URL, AisStreamConfig, Credentials, DEFAULT_PING_INTERVAL, DEFAULT_PONG_TIMEOUT,
    DEFAULT_RECONNECT_DELAY, HeartbeatConfig, ReconnectConfig,
};
use crate::infrastructure::server::{DEFAULT_BATCH_MAX, DEFAULT_QUEUE_CAPACITY};

const API_KEY_VAR: &str = "AISSTREAM_API_KEY";
const URL_VAR: &str = "AISSTREAM_URL";
const BOUNDING_BOXES_VAR: &str = "AIS_BOUNDING_BOXES";
const MMSI_FILTER_VAR: &str = "AIS_MMSI_FILTER";

/// Upstream feed settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// WebSocket URL.
    pub url: String,
    /// Upstream region restriction; empty means the whole globe.
    pub bounding_boxes: Vec<BoundingBox>,
    /// Identity allow-list; empty means every vessel.
    pub mmsi_filter: Vec<Mmsi>,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Interval between upstream pings.
    pub heartbeat_interval: Duration,
    /// Silence after a ping before the connection is dropped.
    pub heartbeat_timeout: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            url: AISSTREAM_URL.to_string(),
            bounding_boxes: Vec::new(),
            mmsi_filter: Vec::new(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_interval: DEFAULT_PING_INTERVAL,
            heartbeat_timeout: DEFAULT_PONG_TIMEOUT,
        }
    }
}

/// Downstream fan-out settings.
#[derive(Debug, Clone)]
pub struct FanoutSettings {
    /// Per-connection update queue capacity.
    pub subscriber_queue: usize,
    /// Maximum updates per `vessels_update` message.
    pub batch_max: usize,
    /// Capacity of the bridge feeding the `/ws/vessels` pool.
    pub bridge_capacity: usize,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            subscriber_queue: DEFAULT_QUEUE_CAPACITY,
            batch_max: DEFAULT_BATCH_MAX,
            bridge_capacity: 4096,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Downstream WebSocket port.
    pub ws_port: u16,
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_port: 5000,
            health_port: 8082,
        }
    }
}

/// Complete proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// API credentials.
    pub credentials: Credentials,
    /// Upstream feed settings.
    pub upstream: UpstreamSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Downstream fan-out settings.
    pub fanout: FanoutSettings,
}

impl ProxyConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or empty, or if the region
    /// or identity filters cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`ProxyConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key =
            lookup(API_KEY_VAR).ok_or_else(|| ConfigError::MissingEnvVar(API_KEY_VAR.to_string()))?;
        let credentials =
            Credentials::new(api_key).map_err(|_| ConfigError::EmptyValue(API_KEY_VAR.to_string()))?;

        let bounding_boxes = match lookup(BOUNDING_BOXES_VAR) {
            Some(raw) => {
                BoundingBox::parse_list(&raw).map_err(|e| ConfigError::InvalidValue {
                    key: BOUNDING_BOXES_VAR.to_string(),
                    reason: e.to_string(),
                })?
            }
            None => Vec::new(),
        };

        let mmsi_filter = lookup(MMSI_FILTER_VAR)
            .map(|raw| parse_mmsi_list(&raw))
            .transpose()?
            .unwrap_or_default();

        let upstream = UpstreamSettings {
            url: lookup(URL_VAR)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| UpstreamSettings::default().url),
            bounding_boxes,
            mmsi_filter,
            reconnect_delay: parse_env_duration_secs(
                &lookup,
                "AIS_PROXY_RECONNECT_DELAY_SECS",
                UpstreamSettings::default().reconnect_delay,
            ),
            heartbeat_interval: parse_env_duration_secs(
                &lookup,
                "AIS_PROXY_HEARTBEAT_INTERVAL_SECS",
                UpstreamSettings::default().heartbeat_interval,
            ),
            heartbeat_timeout: parse_env_duration_secs(
                &lookup,
                "AIS_PROXY_HEARTBEAT_TIMEOUT_SECS",
                UpstreamSettings::default().heartbeat_timeout,
            ),
        };

        let server = ServerSettings {
            ws_port: parse_env(&lookup, "AIS_PROXY_WS_PORT", ServerSettings::default().ws_port),
            health_port: parse_env(
                &lookup,
                "AIS_PROXY_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let fanout = FanoutSettings {
            subscriber_queue: parse_env_nonzero(
                &lookup,
                "AIS_PROXY_SUBSCRIBER_QUEUE",
                FanoutSettings::default().subscriber_queue,
            ),
            batch_max: parse_env_nonzero(
                &lookup,
                "AIS_PROXY_BATCH_MAX",
                FanoutSettings::default().batch_max,
            ),
            bridge_capacity: parse_env_nonzero(
                &lookup,
                "AIS_PROXY_BRIDGE_CAPACITY",
                FanoutSettings::default().bridge_capacity,
            ),
        };

        Ok(Self {
            credentials,
            upstream,
            server,
            fanout,
        })
    }

    /// Build the upstream client configuration.
    #[must_use]
    pub fn to_stream_config(&self) -> AisStreamConfig {
        AisStreamConfig::new(self.credentials.clone())
            .with_url(self.upstream.url.clone())
            .with_bounding_boxes(self.upstream.bounding_boxes.clone())
            .with_mmsi_filter(self.upstream.mmsi_filter.clone())
            .with_reconnect(ReconnectConfig::new(self.upstream.reconnect_delay))
            .with_heartbeat(HeartbeatConfig::new(
                self.upstream.heartbeat_interval,
                self.upstream.heartbeat_timeout,
            ))
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable cannot be parsed.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Parse failure.
        reason: String,
    },
}

fn parse_mmsi_list(raw: &str) -> Result<Vec<Mmsi>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part.bytes().all(|b| b.is_ascii_digit()) {
                Mmsi::new(part).ok_or_else(|| invalid_mmsi(part))
            } else {
                Err(invalid_mmsi(part))
            }
        })
        .collect()
}

fn invalid_mmsi(part: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: MMSI_FILTER_VAR.to_string(),
        reason: format!("{part:?} is not a numeric MMSI"),
    }
}

fn parse_env<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_nonzero<F>(lookup: &F, key: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    match parse_env(lookup, key, default) {
        0 => default,
        value => value,
    }
}

/// Whole seconds; zero falls back to `default`.
fn parse_env_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<ProxyConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ProxyConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn missing_api_key() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "AISSTREAM_API_KEY"));
    }

    #[test]
    fn empty_api_key() {
        let err = config_from(&[("AISSTREAM_API_KEY", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test]
    fn defaults_with_only_api_key() {
        let config = config_from(&[("AISSTREAM_API_KEY", "key123")]).unwrap();
        assert_eq!(config.credentials.api_key(), "key123");
        assert_eq!(config.upstream.url, AISSTREAM_URL);
        assert!(config.upstream.bounding_boxes.is_empty());
        assert!(config.upstream.mmsi_filter.is_empty());
        assert_eq!(config.upstream.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.upstream.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.upstream.heartbeat_timeout, Duration::from_secs(30));
        assert_eq!(config.server.ws_port, 5000);
        assert_eq!(config.server.health_port, 8082);
        assert_eq!(config.fanout.subscriber_queue, 1024);
        assert_eq!(config.fanout.batch_max, 64);
        assert_eq!(config.fanout.bridge_capacity, 4096);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("AISSTREAM_API_KEY", "key123"),
            ("AISSTREAM_URL", "ws://127.0.0.1:9000"),
            ("AIS_BOUNDING_BOXES", "40,27,42,30;0,0,1,1"),
            ("AIS_MMSI_FILTER", "244660000, 259000420"),
            ("AIS_PROXY_RECONNECT_DELAY_SECS", "2"),
            ("AIS_PROXY_WS_PORT", "7000"),
            ("AIS_PROXY_BATCH_MAX", "8"),
        ])
        .unwrap();

        assert_eq!(config.upstream.url, "ws://127.0.0.1:9000");
        assert_eq!(config.upstream.bounding_boxes.len(), 2);
        assert_eq!(config.upstream.mmsi_filter.len(), 2);
        assert_eq!(config.upstream.mmsi_filter[1].as_str(), "259000420");
        assert_eq!(config.upstream.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.server.ws_port, 7000);
        assert_eq!(config.fanout.batch_max, 8);
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let config = config_from(&[
            ("AISSTREAM_API_KEY", "key123"),
            ("AIS_PROXY_WS_PORT", "not-a-port"),
            ("AIS_PROXY_SUBSCRIBER_QUEUE", "0"),
        ])
        .unwrap();
        assert_eq!(config.server.ws_port, 5000);
        assert_eq!(config.fanout.subscriber_queue, 1024);
    }

    #[test]
    fn zero_durations_fall_back() {
        let config = config_from(&[
            ("AISSTREAM_API_KEY", "key123"),
            ("AIS_PROXY_RECONNECT_DELAY_SECS", "0"),
            ("AIS_PROXY_HEARTBEAT_INTERVAL_SECS", "0"),
            ("AIS_PROXY_HEARTBEAT_TIMEOUT_SECS", " 0 "),
        ])
        .unwrap();
        assert_eq!(config.upstream.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.upstream.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.upstream.heartbeat_timeout, Duration::from_secs(30));
    }

    #[test]
    fn invalid_bounding_box_is_an_error() {
        let err = config_from(&[
            ("AISSTREAM_API_KEY", "key123"),
            ("AIS_BOUNDING_BOXES", "-10,170,10,-170"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "AIS_BOUNDING_BOXES"));
    }

    #[test]
    fn invalid_mmsi_is_an_error() {
        let err = config_from(&[
            ("AISSTREAM_API_KEY", "key123"),
            ("AIS_MMSI_FILTER", "244660000,abc"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "AIS_MMSI_FILTER"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = config_from(&[("AISSTREAM_API_KEY", "key123")]).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("key123"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn stream_config_carries_settings() {
        let config = config_from(&[
            ("AISSTREAM_API_KEY", "key123"),
            ("AIS_BOUNDING_BOXES", "40,27,42,30"),
            ("AIS_PROXY_RECONNECT_DELAY_SECS", "1"),
            ("AIS_PROXY_HEARTBEAT_INTERVAL_SECS", "15"),
            ("AIS_PROXY_HEARTBEAT_TIMEOUT_SECS", "45"),
        ])
        .unwrap();
        let stream = config.to_stream_config();
        assert_eq!(stream.bounding_boxes.len(), 1);
        assert_eq!(stream.reconnect.delay, Duration::from_secs(1));
        assert_eq!(
            stream.heartbeat,
            HeartbeatConfig::new(Duration::from_secs(15), Duration::from_secs(45))
        );
        assert_eq!(stream.credentials.api_key(), "key123");
    }
}
