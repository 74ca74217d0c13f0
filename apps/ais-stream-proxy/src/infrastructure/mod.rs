//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations around the domain: the upstream feed client,
//! the subscriber registry, the downstream WebSocket server and the
//! operational surfaces.

/// AISStream.io WebSocket client, codec and normalizer.
pub mod aisstream;

/// Subscriber registry and fan-out.
pub mod broadcast;

/// Proxy lifecycle controller.
pub mod proxy;

/// Downstream WebSocket server.
pub mod server;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
