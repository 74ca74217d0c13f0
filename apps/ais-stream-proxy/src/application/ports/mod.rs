//! Port Interfaces
//!
//! ## Driven Ports (Outbound)
//!
//! - `VesselSink`: one downstream subscriber that vessel updates are pushed to

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::vessel::VesselUpdate;

/// Reasons a delivery to a subscriber can fail.
///
/// Any failure causes the subscriber to be evicted from its registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The subscriber's connection has gone away.
    #[error("subscriber disconnected")]
    Disconnected,

    /// The subscriber is not draining its queue fast enough.
    #[error("subscriber queue full")]
    QueueFull,

    /// Any other transport failure.
    #[error("delivery failed: {0}")]
    Transport(String),
}

/// A downstream subscriber.
///
/// Implementations must not block on a slow peer: the broadcaster calls
/// `deliver` sequentially for every matching subscriber of every update.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VesselSink: Send + Sync {
    /// Push one update to the subscriber.
    async fn deliver(&self, update: Arc<VesselUpdate>) -> Result<(), DeliveryError>;
}
