//! Domain Layer - Core vessel types and business rules.
//!
//! Pure types with no I/O: vessel records and classification, geographic
//! regions, and the static-attribute cache.

/// Vessel identity, ship types and the outward-facing update record.
pub mod vessel;

/// Bounding-box regions.
pub mod region;

/// Per-vessel static attribute cache.
pub mod static_data;
