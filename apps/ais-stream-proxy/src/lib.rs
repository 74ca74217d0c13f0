#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! AIS Stream Proxy - Vessel Feed Multiplexer
//!
//! Maintains a single upstream WebSocket connection to AISStream.io,
//! normalizes position and static-data frames into canonical vessel updates,
//! and fans them out to many downstream WebSocket clients with optional
//! per-client region filters.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: Vessel types and pure logic
//!   - `vessel`: Identity, ship categories, classification heuristics
//!   - `region`: Bounding boxes
//!   - `static_data`: Per-vessel static attribute cache
//!
//! - **Application**: Port definitions
//!   - `ports`: The `VesselSink` delivery interface
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `aisstream`: Upstream client, frame codec, normalizer
//!   - `broadcast`: Subscriber registry and fan-out
//!   - `proxy`: Start/stop lifecycle controller
//!   - `server`: Downstream WebSocket server
//!   - `config`, `health`, `metrics`, `telemetry`: Ambient services
//!
//! # Data Flow
//!
//! ```text
//!                     ┌────────────┐     ┌──────────────┐
//! AISStream.io WS ───►│ Normalizer │────►│   Registry   │──► /ws/ais-stream clients
//!                     │  + cache   │     │ (ais_stream) │
//!                     └────────────┘     └──────┬───────┘
//!                                               │ external sink
//!                                        ┌──────▼───────┐
//!                                        │   Registry   │──► /ws/vessels clients
//!                                        │  (vessels)   │
//!                                        └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Vessel types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::region::{BoundingBox, RegionError};
pub use domain::static_data::{StaticAttributes, StaticDataCache};
pub use domain::vessel::{Mmsi, RawShipType, ShipCategory, VesselUpdate};

// Ports
pub use application::ports::{DeliveryError, VesselSink};

// Upstream
pub use infrastructure::aisstream::{
    AisStreamClient, AisStreamConfig, ConnectionState, Credentials, CredentialsError, FeedState,
    MessageNormalizer,
};

// Fan-out
pub use infrastructure::broadcast::{
    BroadcastOutcome, ChannelSink, ExternalSink, RegistryStats, SharedRegistry, SubscriberId,
    SubscriptionRegistry, bridge_sink,
};

// Lifecycle
pub use infrastructure::proxy::ProxyController;

// Downstream server
pub use infrastructure::server::{ServerState, WebSocketServer, WebSocketServerError};

// Configuration
pub use infrastructure::config::{ConfigError, ProxyConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::{Pool as MetricsPool, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
