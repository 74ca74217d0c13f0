//! Vessel Types
//!
//! Canonical vessel types shared by the normalizer, the static-data cache and
//! the broadcaster. These types carry no wire-format knowledge of the upstream
//! feed; `VesselUpdate` is the only record that leaves the proxy.

pub mod classification;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use classification::{
    BALLAST_DRAUGHT_MAX_METERS, ClassifiedShipType, STATIONARY_SPEED_KNOTS, classify_ship_type,
    container_line_override, is_anchored_status, is_ballast, is_stationary,
    navigational_status_label, normalize_destination,
};

// =============================================================================
// Identity
// =============================================================================

/// Maritime Mobile Service Identity, the primary key for all per-vessel state.
///
/// Always non-empty. Upstream numeric identities are rendered in decimal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mmsi(String);

impl Mmsi {
    /// Create an identity from a raw string.
    ///
    /// Returns `None` when the trimmed value is empty.
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for Mmsi {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Mmsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Ship Type
// =============================================================================

/// Human ship category derived from the raw AIS ship type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShipCategory {
    /// Crude, product, chemical and gas carriers.
    Tanker,
    /// Container ships.
    Container,
    /// Bulk and general cargo.
    Cargo,
    /// Passenger vessels and ferries.
    Passenger,
    /// Fishing vessels.
    Fishing,
    /// Tugs and towing vessels.
    Tug,
    /// Pilot boats and special craft.
    Pilot,
    /// Anything unclassifiable.
    #[default]
    Other,
}

impl ShipCategory {
    /// Get the category name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tanker => "Tanker",
            Self::Container => "Container",
            Self::Cargo => "Cargo",
            Self::Passenger => "Passenger",
            Self::Fishing => "Fishing",
            Self::Tug => "Tug",
            Self::Pilot => "Pilot",
            Self::Other => "Other",
        }
    }
}

/// Raw ship type as reported upstream: either an ITU numeric code or free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawShipType {
    /// Numeric ITU-R M.1371 ship and cargo type code.
    Code(u32),
    /// Textual ship type description.
    Text(String),
}

impl RawShipType {
    /// Build a raw ship type from text, treating digit-only strings as codes.
    ///
    /// Returns `None` for empty text.
    #[must_use]
    pub fn from_text(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return trimmed.parse().ok().map(Self::Code);
        }
        Some(Self::Text(trimmed.to_string()))
    }

    /// Whether this value carries usable type information.
    ///
    /// Code 0 means "not available" in AIS, and empty text carries nothing.
    #[must_use]
    pub fn is_meaningful(&self) -> bool {
        match self {
            Self::Code(code) => *code != 0,
            Self::Text(text) => !text.trim().is_empty(),
        }
    }
}

// =============================================================================
// Vessel Update
// =============================================================================

/// Canonical, outward-facing vessel record emitted for every position report.
///
/// Never mutated after emission; shared with subscribers as `Arc<VesselUpdate>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselUpdate {
    /// Vessel identity.
    pub mmsi: Mmsi,
    /// Display name.
    pub name: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Speed over ground in knots.
    pub speed: f64,
    /// Course over ground in degrees.
    pub course: f64,
    /// True heading in degrees.
    pub heading: f64,
    /// Ship type label, e.g. `"Tanker (84)"`.
    pub ship_type: Option<String>,
    /// Human ship category.
    pub ship_category: ShipCategory,
    /// Declared destination, if any.
    pub destination: Option<String>,
    /// Navigational status text.
    pub status: String,
    /// Position timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Low-draught heuristic for an empty vessel.
    pub is_ballast: bool,
    /// Navigational status is "at anchor".
    pub is_anchored: bool,
    /// Speed over ground below the stationary threshold.
    pub is_stationary: bool,
    /// Draught in meters, if known.
    pub draught: Option<f64>,
}
