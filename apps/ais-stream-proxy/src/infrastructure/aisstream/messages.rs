//! AISStream Message Types
//!
//! Wire format types for the AISStream.io WebSocket feed.
//!
//! # Inbound Envelope
//!
//! ```json
//! {
//!   "MessageType": "PositionReport",
//!   "MetaData": {"MMSI": 259000420, "ShipName": "AUGUSTSON", "latitude": 66.02,
//!                "longitude": 12.25, "time_utc": "2022-12-29 18:22:32.318353 +0000 UTC"},
//!   "Message": {"PositionReport": {"UserID": 259000420, "Latitude": 66.02, "Sog": 0, ...}}
//! }
//! ```
//!
//! Rejected subscriptions produce `{"error": "..."}` before the socket closes.
//!
//! # Leniency
//!
//! AIS transponders are sloppy: numbers arrive as strings, text is padded
//! and fields go missing. Every payload field is optional, numeric strings
//! are coerced, and any other mismatch deserializes as `None`.
//!
//! # References
//!
//! - [AISStream documentation](https://aisstream.io/documentation)

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::region::BoundingBox;
use crate::domain::vessel::{Mmsi, RawShipType};

/// Message types requested from the upstream.
pub const SUBSCRIBED_MESSAGE_TYPES: [&str; 2] = ["PositionReport", "ShipStaticData"];

// =============================================================================
// Decoded Frame
// =============================================================================

/// One decoded upstream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum AisFrame {
    /// Live kinematic report.
    PositionReport {
        /// Envelope metadata.
        meta: MetaData,
        /// Report body.
        report: PositionReport,
    },
    /// Static identity and voyage data.
    ShipStaticData {
        /// Envelope metadata.
        meta: MetaData,
        /// Static body.
        data: ShipStaticData,
    },
    /// Upstream error notice.
    Error(String),
    /// A message type this proxy does not consume.
    Unknown(String),
}

impl AisFrame {
    /// Message type label used for logging and metrics.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::PositionReport { .. } => "PositionReport",
            Self::ShipStaticData { .. } => "ShipStaticData",
            Self::Error(_) => "error",
            Self::Unknown(kind) => kind,
        }
    }
}

/// Raw envelope before dispatch on `MessageType`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(rename = "MessageType", default, deserialize_with = "lenient_string")]
    pub message_type: Option<String>,

    #[serde(rename = "MetaData", default)]
    pub meta: Option<MetaData>,

    #[serde(rename = "Message", default)]
    pub message: Option<Value>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,
}

// =============================================================================
// Payloads
// =============================================================================

/// Envelope metadata attached to every message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MetaData {
    /// Vessel identity.
    #[serde(rename = "MMSI", default, deserialize_with = "lenient_mmsi")]
    pub mmsi: Option<Mmsi>,

    /// Vessel name, usually space padded.
    #[serde(rename = "ShipName", default, deserialize_with = "lenient_string")]
    pub ship_name: Option<String>,

    /// Latitude in degrees.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,

    /// Longitude in degrees.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,

    /// Receive time, e.g. `2022-12-29 18:22:32.318353 +0000 UTC`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub time_utc: Option<String>,

    /// Ship type, when the upstream attaches one to the metadata.
    #[serde(rename = "ShipType", default, deserialize_with = "lenient_ship_type")]
    pub ship_type: Option<RawShipType>,

    /// Destination, when attached to the metadata.
    #[serde(rename = "Destination", default, deserialize_with = "lenient_string")]
    pub destination: Option<String>,

    /// Draught in meters, when attached to the metadata.
    #[serde(rename = "Draught", default, deserialize_with = "lenient_f64")]
    pub draught: Option<f64>,
}

/// Class A position report body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PositionReport {
    /// Vessel identity as carried in the payload.
    #[serde(rename = "UserID", default, deserialize_with = "lenient_mmsi")]
    pub user_id: Option<Mmsi>,

    /// Latitude in degrees.
    #[serde(rename = "Latitude", default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,

    /// Longitude in degrees.
    #[serde(rename = "Longitude", default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,

    /// Speed over ground in knots.
    #[serde(rename = "Sog", default, deserialize_with = "lenient_f64")]
    pub sog: Option<f64>,

    /// Course over ground in degrees.
    #[serde(rename = "Cog", default, deserialize_with = "lenient_f64")]
    pub cog: Option<f64>,

    /// True heading in degrees (511 = not available).
    #[serde(rename = "TrueHeading", default, deserialize_with = "lenient_f64")]
    pub true_heading: Option<f64>,

    /// Navigational status.
    #[serde(
        rename = "NavigationalStatus",
        default,
        deserialize_with = "lenient_status"
    )]
    pub navigational_status: Option<NavigationalStatus>,
}

/// Static and voyage data body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ShipStaticData {
    /// Vessel identity as carried in the payload.
    #[serde(rename = "UserID", default, deserialize_with = "lenient_mmsi")]
    pub user_id: Option<Mmsi>,

    /// Ship and cargo type.
    #[serde(rename = "Type", default, deserialize_with = "lenient_ship_type")]
    pub ship_type: Option<RawShipType>,

    /// Vessel name.
    #[serde(rename = "Name", default, deserialize_with = "lenient_string")]
    pub name: Option<String>,

    /// Radio call sign.
    #[serde(rename = "CallSign", default, deserialize_with = "lenient_string")]
    pub call_sign: Option<String>,

    /// Declared destination.
    #[serde(rename = "Destination", default, deserialize_with = "lenient_string")]
    pub destination: Option<String>,

    /// Maximum static draught in meters.
    #[serde(
        rename = "MaximumStaticDraught",
        default,
        deserialize_with = "lenient_f64"
    )]
    pub maximum_static_draught: Option<f64>,
}

/// Navigational status: an ITU code or free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationalStatus {
    /// ITU-R M.1371 status code.
    Code(i64),
    /// Textual status.
    Text(String),
}

impl NavigationalStatus {
    /// Numeric code, if this is one.
    #[must_use]
    pub const fn code(&self) -> Option<i64> {
        match self {
            Self::Code(code) => Some(*code),
            Self::Text(_) => None,
        }
    }
}

// =============================================================================
// Subscription Request
// =============================================================================

/// Subscription sent once after every (re)connect.
///
/// # Wire Format (JSON)
/// ```json
/// {"APIKey": "...", "BoundingBoxes": [[[-90, -180], [90, 180]]],
///  "FilterMessageTypes": ["PositionReport", "ShipStaticData"]}
/// ```
#[derive(Clone, PartialEq, Serialize)]
pub struct SubscriptionRequest {
    /// Upstream API key.
    #[serde(rename = "APIKey")]
    pub api_key: String,

    /// Corner pairs of the subscribed regions.
    #[serde(rename = "BoundingBoxes")]
    pub bounding_boxes: Vec<[[f64; 2]; 2]>,

    /// Requested message types.
    #[serde(rename = "FilterMessageTypes")]
    pub filter_message_types: Vec<String>,

    /// Identity allow-list; omitted when empty.
    #[serde(rename = "FiltersShipMMSI", skip_serializing_if = "Vec::is_empty")]
    pub filters_ship_mmsi: Vec<String>,
}

impl SubscriptionRequest {
    /// Build a request. No boxes means the whole globe.
    #[must_use]
    pub fn new(api_key: impl Into<String>, boxes: &[BoundingBox], mmsi_filter: &[Mmsi]) -> Self {
        let bounding_boxes = if boxes.is_empty() {
            vec![BoundingBox::GLOBE.to_corners()]
        } else {
            boxes.iter().map(BoundingBox::to_corners).collect()
        };

        Self {
            api_key: api_key.into(),
            bounding_boxes,
            filter_message_types: SUBSCRIBED_MESSAGE_TYPES
                .iter()
                .map(ToString::to_string)
                .collect(),
            filters_ship_mmsi: mmsi_filter.iter().map(|m| m.as_str().to_string()).collect(),
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl std::fmt::Debug for SubscriptionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRequest")
            .field("api_key", &"[REDACTED]")
            .field("bounding_boxes", &self.bounding_boxes)
            .field("filter_message_types", &self.filter_message_types)
            .field("filters_ship_mmsi", &self.filters_ship_mmsi)
            .finish()
    }
}

// =============================================================================
// Lenient Deserializers
// =============================================================================

fn value_to_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_f64))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_string))
}

fn lenient_mmsi<'de, D>(deserializer: D) -> Result<Option<Mmsi>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().map(Mmsi::from),
        Some(Value::String(s)) => Mmsi::new(s),
        _ => None,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lenient_ship_type<'de, D>(deserializer: D) -> Result<Option<RawShipType>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|code| u32::try_from(code).ok())
            .map(RawShipType::Code),
        Some(Value::String(s)) => RawShipType::from_text(&s),
        _ => None,
    })
}

fn lenient_status<'de, D>(deserializer: D) -> Result<Option<NavigationalStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().map(NavigationalStatus::Code),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else if let Ok(code) = trimmed.parse::<i64>() {
                Some(NavigationalStatus::Code(code))
            } else {
                Some(NavigationalStatus::Text(trimmed.to_string()))
            }
        }
        _ => None,
    })
}
