//! Configuration Module
//!
//! Environment-driven configuration for the proxy service.

mod settings;

pub use settings::{ConfigError, FanoutSettings, ProxyConfig, ServerSettings, UpstreamSettings};
