//! AISStream.io Adapter
//!
//! Upstream side of the proxy:
//!
//! - **client**: connection lifecycle, subscription and reconnect loop
//! - **heartbeat**: ping/timeout liveness check for half-open connections
//! - **codec** / **messages**: JSON wire format and lenient decoding
//! - **normalizer**: frame → `VesselUpdate` enrichment against the static cache

pub mod auth;
pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod normalizer;
pub mod reconnect;

pub use auth::{Credentials, CredentialsError};
pub use client::{AISSTREAM_URL, AisStreamClient, AisStreamConfig, AisStreamError, ConnectionState, FeedState};
pub use codec::{CodecError, FrameCodec};
pub use heartbeat::{DEFAULT_PING_INTERVAL, DEFAULT_PONG_TIMEOUT, HeartbeatConfig};
pub use messages::{AisFrame, MetaData, NavigationalStatus, PositionReport, ShipStaticData, SubscriptionRequest};
pub use normalizer::{MessageNormalizer, parse_timestamp};
pub use reconnect::{DEFAULT_RECONNECT_DELAY, ReconnectConfig, ReconnectPolicy};
