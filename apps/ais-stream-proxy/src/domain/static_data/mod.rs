//! Static Vessel Data
//!
//! Slow-changing per-vessel attributes learned from `ShipStaticData` reports
//! and consulted when normalizing position reports.
//!
//! Records are created on first sight of an identity, merged field by field
//! afterwards, and never evicted.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::vessel::{Mmsi, RawShipType};

// =============================================================================
// Attributes
// =============================================================================

/// Cached static attributes for one vessel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticAttributes {
    /// Raw ship type as last reported.
    pub ship_type: Option<RawShipType>,
    /// Display name.
    pub name: Option<String>,
    /// Radio call sign.
    pub call_sign: Option<String>,
    /// Declared destination.
    pub destination: Option<String>,
    /// Maximum static draught in meters.
    pub max_draught: Option<f64>,
}

impl StaticAttributes {
    /// Merge a partial update into this record.
    ///
    /// Present fields overwrite, absent fields are preserved. Blank strings,
    /// meaningless ship types and a zero draught (AIS "not available") count
    /// as absent.
    pub fn merge(&mut self, update: Self) {
        if let Some(ship_type) = update.ship_type.filter(RawShipType::is_meaningful) {
            self.ship_type = Some(ship_type);
        }
        merge_text(&mut self.name, update.name);
        merge_text(&mut self.call_sign, update.call_sign);
        merge_text(&mut self.destination, update.destination);
        if let Some(draught) = update.max_draught.filter(|d| *d > 0.0) {
            self.max_draught = Some(draught);
        }
    }

    /// Ship type, if it carries usable information.
    #[must_use]
    pub fn meaningful_ship_type(&self) -> Option<&RawShipType> {
        self.ship_type.as_ref().filter(|t| t.is_meaningful())
    }
}

fn merge_text(slot: &mut Option<String>, value: Option<String>) {
    if let Some(text) = value {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            *slot = Some(trimmed.to_string());
        }
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Concurrency-safe map from vessel identity to static attributes.
///
/// Readers always observe whole records; each upsert happens under one
/// write lock.
#[derive(Debug, Default)]
pub struct StaticDataCache {
    entries: RwLock<HashMap<Mmsi, StaticAttributes>>,
}

impl StaticDataCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `update` into the record for `mmsi`, creating it if absent.
    pub fn upsert(&self, mmsi: Mmsi, update: StaticAttributes) {
        self.entries.write().entry(mmsi).or_default().merge(update);
    }

    /// Snapshot of the record for `mmsi`.
    #[must_use]
    pub fn get(&self, mmsi: &Mmsi) -> Option<StaticAttributes> {
        self.entries.read().get(mmsi).cloned()
    }

    /// Number of vessels with cached attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
