//! Message Normalizer
//!
//! Turns decoded upstream frames into canonical [`VesselUpdate`] records.
//!
//! - `ShipStaticData` frames are merged into the [`StaticDataCache`] and
//!   produce no output.
//! - `PositionReport` frames are enriched from the cache and classified.
//! - Everything else is ignored.
//!
//! Normalization never fails: missing or malformed fields fall back to
//! defaults, and only frames without any vessel identity are dropped.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};

use super::messages::{AisFrame, MetaData, NavigationalStatus, PositionReport, ShipStaticData};
use crate::domain::static_data::{StaticAttributes, StaticDataCache};
use crate::domain::vessel::{
    Mmsi, ShipCategory, VesselUpdate, classify_ship_type, container_line_override,
    is_anchored_status, is_ballast, is_stationary, navigational_status_label,
    normalize_destination,
};

/// Status reported when a position carries none.
pub const DEFAULT_STATUS: &str = "Underway";

/// AISStream `time_utc` layout, e.g. `2022-12-29 18:22:32.318353 +0000 UTC`.
const AISSTREAM_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z UTC";

/// Stateful normalizer backed by the shared static-data cache.
#[derive(Debug, Clone)]
pub struct MessageNormalizer {
    cache: Arc<StaticDataCache>,
}

impl MessageNormalizer {
    /// Create a normalizer over `cache`.
    #[must_use]
    pub const fn new(cache: Arc<StaticDataCache>) -> Self {
        Self { cache }
    }

    /// The backing cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<StaticDataCache> {
        &self.cache
    }

    /// Normalize a frame, stamping fallbacks with the current time.
    #[must_use]
    pub fn normalize(&self, frame: AisFrame) -> Option<VesselUpdate> {
        self.normalize_at(frame, Utc::now())
    }

    /// Normalize a frame received at `received_at`.
    ///
    /// Returns `Some` only for position reports carrying an identity.
    #[must_use]
    pub fn normalize_at(&self, frame: AisFrame, received_at: DateTime<Utc>) -> Option<VesselUpdate> {
        match frame {
            AisFrame::PositionReport { meta, report } => {
                self.position_update(meta, report, received_at)
            }
            AisFrame::ShipStaticData { meta, data } => {
                self.absorb_static(meta, data);
                None
            }
            AisFrame::Error(_) | AisFrame::Unknown(_) => None,
        }
    }

    fn absorb_static(&self, meta: MetaData, data: ShipStaticData) {
        let Some(mmsi) = meta.mmsi.or(data.user_id) else {
            tracing::debug!("Dropping static data without identity");
            return;
        };

        tracing::trace!(
            mmsi = %mmsi,
            ship_type = ?data.ship_type,
            draught = ?data.maximum_static_draught,
            "Static data"
        );

        self.cache.upsert(
            mmsi,
            StaticAttributes {
                ship_type: data.ship_type,
                name: data.name.as_deref().and_then(clean_name),
                call_sign: data.call_sign,
                destination: data.destination,
                max_draught: data.maximum_static_draught,
            },
        );
    }

    fn position_update(
        &self,
        meta: MetaData,
        report: PositionReport,
        received_at: DateTime<Utc>,
    ) -> Option<VesselUpdate> {
        let Some(mmsi) = meta.mmsi.or(report.user_id) else {
            tracing::debug!("Dropping position report without identity");
            return None;
        };

        let cached = self.cache.get(&mmsi).unwrap_or_default();

        let name = meta
            .ship_name
            .as_deref()
            .and_then(clean_name)
            .or_else(|| cached.name.as_deref().and_then(clean_name))
            .unwrap_or_else(|| fallback_name(&mmsi));

        let raw_type = cached
            .meaningful_ship_type()
            .cloned()
            .or(meta.ship_type);
        let classified = classify_ship_type(raw_type.as_ref());
        let ship_category = if container_line_override(&name) {
            ShipCategory::Container
        } else {
            classified.category
        };

        let destination = normalize_destination(meta.destination.as_deref())
            .or_else(|| normalize_destination(cached.destination.as_deref()));

        // Zero is the AIS "not available" draught.
        let draught = cached
            .max_draught
            .filter(|d| *d > 0.0)
            .or(meta.draught);

        let speed = report.sog.unwrap_or(0.0);
        let status_code = report
            .navigational_status
            .as_ref()
            .and_then(NavigationalStatus::code);
        let status = match report.navigational_status {
            Some(NavigationalStatus::Text(text)) => text,
            Some(NavigationalStatus::Code(code)) => navigational_status_label(code),
            None => DEFAULT_STATUS.to_string(),
        };

        Some(VesselUpdate {
            name,
            latitude: report.latitude.or(meta.latitude).unwrap_or(0.0),
            longitude: report.longitude.or(meta.longitude).unwrap_or(0.0),
            speed,
            course: report.cog.unwrap_or(0.0),
            heading: report.true_heading.unwrap_or(0.0),
            ship_type: classified.label,
            ship_category,
            destination,
            status,
            timestamp: parse_timestamp(meta.time_utc.as_deref()).unwrap_or(received_at),
            is_ballast: is_ballast(draught),
            is_anchored: is_anchored_status(status_code),
            is_stationary: is_stationary(speed),
            draught,
            mmsi,
        })
    }
}

/// Parse an upstream timestamp in the AISStream layout or RFC 3339.
#[must_use]
pub fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    DateTime::parse_from_str(raw, AISSTREAM_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // Some feeds drop the offset entirely.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Trim whitespace and AIS `@` padding; blank names are absent.
fn clean_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || c == '@');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn fallback_name(mmsi: &Mmsi) -> String {
    format!("Vessel {mmsi}")
}
