//! Application Layer - Port definitions.
//!
//! Contracts the infrastructure adapters implement so the broadcaster can
//! stay ignorant of how a subscriber is actually reached.

/// Port interfaces for downstream delivery.
pub mod ports;
