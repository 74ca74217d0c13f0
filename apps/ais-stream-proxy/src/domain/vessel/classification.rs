//! Ship Classification Heuristics
//!
//! Maps raw AIS ship types to human categories and derives the boolean
//! condition flags carried on every `VesselUpdate`.
//!
//! # Numeric Codes (ITU-R M.1371)
//!
//! | Codes | Category  |
//! |-------|-----------|
//! | 30-39 | Fishing   |
//! | 40-49 | Tug       |
//! | 50-59 | Pilot     |
//! | 60-69 | Passenger |
//! | 70-79 | Cargo     |
//! | 80-89 | Tanker    |
//! | other | Other     |

use super::{RawShipType, ShipCategory};

/// Draught at or below which a vessel is considered to be in ballast.
pub const BALLAST_DRAUGHT_MAX_METERS: f64 = 4.0;

/// Speed over ground below which a vessel is considered stationary.
pub const STATIONARY_SPEED_KNOTS: f64 = 0.5;

/// Navigational status code for "at anchor".
const AT_ANCHOR_STATUS: i64 = 1;

/// Name fragments of the major container lines.
///
/// Carriers frequently misreport or omit the type code, so a name match
/// overrides the type-based category.
const CONTAINER_LINE_TOKENS: &[&str] = &[
    "MSC",
    "MAERSK",
    "CMA CGM",
    "COSCO",
    "EVERGREEN",
    "HAPAG",
    "ONE ",
    "YANG MING",
    "YM ",
    "HMM ",
];

/// Result of classifying a raw ship type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedShipType {
    /// Display label, absent when the type is unknown.
    pub label: Option<String>,
    /// Human category.
    pub category: ShipCategory,
}

impl ClassifiedShipType {
    const fn unknown() -> Self {
        Self {
            label: None,
            category: ShipCategory::Other,
        }
    }
}

/// Classify a raw ship type. Never fails; unclassifiable input is `Other`.
#[must_use]
pub fn classify_ship_type(raw: Option<&RawShipType>) -> ClassifiedShipType {
    match raw {
        None => ClassifiedShipType::unknown(),
        Some(RawShipType::Code(code)) => classify_code(*code),
        Some(RawShipType::Text(text)) => classify_text(text),
    }
}

fn classify_code(code: u32) -> ClassifiedShipType {
    let (category, label) = match code {
        80..=89 => (ShipCategory::Tanker, format!("Tanker ({code})")),
        70..=79 => (ShipCategory::Cargo, format!("Cargo ({code})")),
        60..=69 => (ShipCategory::Passenger, format!("Passenger ({code})")),
        30..=39 => (ShipCategory::Fishing, format!("Fishing ({code})")),
        40..=49 => (ShipCategory::Tug, format!("Tug ({code})")),
        50..=59 => (ShipCategory::Pilot, format!("Pilot ({code})")),
        _ => (ShipCategory::Other, format!("Type {code}")),
    };
    ClassifiedShipType {
        label: Some(label),
        category,
    }
}

fn classify_text(text: &str) -> ClassifiedShipType {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "Unknown" {
        return ClassifiedShipType::unknown();
    }
    if let Some(RawShipType::Code(code)) = RawShipType::from_text(trimmed) {
        return classify_code(code);
    }

    let lower = trimmed.to_lowercase();
    let category = if contains_any(&lower, &["tanker", "lng", "lpg"]) {
        ShipCategory::Tanker
    } else if lower.contains("container") {
        ShipCategory::Container
    } else if contains_any(&lower, &["cargo", "bulk", "general"]) {
        ShipCategory::Cargo
    } else if lower.contains("passenger") {
        ShipCategory::Passenger
    } else {
        ShipCategory::Other
    };

    ClassifiedShipType {
        label: Some(trimmed.to_string()),
        category,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Whether the vessel name belongs to a major container line.
#[must_use]
pub fn container_line_override(name: &str) -> bool {
    let upper = name.to_uppercase();
    CONTAINER_LINE_TOKENS
        .iter()
        .any(|token| upper.contains(token))
}

/// Normalize a declared destination; `""`, `"N/A"` and `"n/a"` mean none.
#[must_use]
pub fn normalize_destination(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    match trimmed {
        "" | "N/A" | "n/a" => None,
        other => Some(other.to_string()),
    }
}

/// Low-draught heuristic: known draught at or below 4.0 m.
#[must_use]
pub fn is_ballast(draught: Option<f64>) -> bool {
    draught.is_some_and(|d| d <= BALLAST_DRAUGHT_MAX_METERS)
}

/// Navigational status code 1 ("at anchor").
#[must_use]
pub fn is_anchored_status(code: Option<i64>) -> bool {
    code == Some(AT_ANCHOR_STATUS)
}

/// Speed over ground below 0.5 knots.
#[must_use]
pub fn is_stationary(speed_knots: f64) -> bool {
    speed_knots < STATIONARY_SPEED_KNOTS
}

/// ITU-R M.1371 navigational status label for a numeric code.
#[must_use]
pub fn navigational_status_label(code: i64) -> String {
    let label = match code {
        0 => "Under way using engine",
        1 => "At anchor",
        2 => "Not under command",
        3 => "Restricted manoeuvrability",
        4 => "Constrained by draught",
        5 => "Moored",
        6 => "Aground",
        7 => "Engaged in fishing",
        8 => "Under way sailing",
        14 => "AIS-SART active",
        15 => "Not defined",
        other => return format!("Status {other}"),
    };
    label.to_string()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    #[test_case(80, ShipCategory::Tanker ; "tanker lower bound")]
    #[test_case(89, ShipCategory::Tanker ; "tanker upper bound")]
    #[test_case(79, ShipCategory::Cargo ; "cargo upper bound")]
    #[test_case(70, ShipCategory::Cargo ; "cargo lower bound")]
    #[test_case(90, ShipCategory::Other ; "above tanker range")]
    #[test_case(60, ShipCategory::Passenger ; "passenger")]
    #[test_case(30, ShipCategory::Fishing ; "fishing")]
    #[test_case(52, ShipCategory::Pilot ; "pilot range")]
    #[test_case(45, ShipCategory::Tug ; "tug range")]
    #[test_case(0, ShipCategory::Other ; "not available")]
    fn numeric_codes(code: u32, expected: ShipCategory) {
        let classified = classify_ship_type(Some(&RawShipType::Code(code)));
        assert_eq!(classified.category, expected);
    }

    #[test]
    fn numeric_labels() {
        assert_eq!(
            classify_ship_type(Some(&RawShipType::Code(84))).label.as_deref(),
            Some("Tanker (84)")
        );
        assert_eq!(
            classify_ship_type(Some(&RawShipType::Code(12))).label.as_deref(),
            Some("Type 12")
        );
    }

    #[test_case("Crude Oil Tanker", ShipCategory::Tanker)]
    #[test_case("LNG Carrier", ShipCategory::Tanker)]
    #[test_case("lpg", ShipCategory::Tanker)]
    #[test_case("Container Ship", ShipCategory::Container)]
    #[test_case("Bulk Carrier", ShipCategory::Cargo)]
    #[test_case("General Cargo", ShipCategory::Cargo)]
    #[test_case("Passenger Ferry", ShipCategory::Passenger)]
    #[test_case("Yacht", ShipCategory::Other)]
    fn textual_types(text: &str, expected: ShipCategory) {
        let raw = RawShipType::Text(text.to_string());
        let classified = classify_ship_type(Some(&raw));
        assert_eq!(classified.category, expected);
        assert_eq!(classified.label.as_deref(), Some(text));
    }

    #[test]
    fn tanker_outranks_container_in_text() {
        let raw = RawShipType::Text("Container / Tanker".to_string());
        assert_eq!(classify_ship_type(Some(&raw)).category, ShipCategory::Tanker);
    }

    #[test]
    fn missing_and_unknown_types() {
        assert_eq!(classify_ship_type(None), ClassifiedShipType::unknown());
        let unknown = RawShipType::Text("Unknown".to_string());
        assert_eq!(
            classify_ship_type(Some(&unknown)),
            ClassifiedShipType::unknown()
        );
    }

    #[test]
    fn container_line_names() {
        assert!(container_line_override("MAERSK LINE 2"));
        assert!(container_line_override("msc anna"));
        assert!(container_line_override("ONE APUS"));
        assert!(container_line_override("HMM ALGECIRAS"));
        assert!(!container_line_override("NORDIC SPIRIT"));
        // "ONE " requires the trailing space
        assert!(!container_line_override("SOMEONE"));
    }

    #[test]
    fn destination_normalization() {
        assert_eq!(normalize_destination(Some("N/A")), None);
        assert_eq!(normalize_destination(Some("n/a")), None);
        assert_eq!(normalize_destination(Some("")), None);
        assert_eq!(normalize_destination(None), None);
        assert_eq!(
            normalize_destination(Some("ROTTERDAM")).as_deref(),
            Some("ROTTERDAM")
        );
    }

    #[test]
    fn ballast_threshold() {
        assert!(is_ballast(Some(4.0)));
        assert!(!is_ballast(Some(4.01)));
        assert!(!is_ballast(None));
    }

    #[test]
    fn anchored_and_stationary() {
        assert!(is_anchored_status(Some(1)));
        assert!(!is_anchored_status(Some(0)));
        assert!(!is_anchored_status(None));
        assert!(is_stationary(0.0));
        assert!(is_stationary(0.49));
        assert!(!is_stationary(0.5));
    }

    #[test]
    fn status_labels() {
        assert_eq!(navigational_status_label(1), "At anchor");
        assert_eq!(navigational_status_label(5), "Moored");
        assert_eq!(navigational_status_label(11), "Status 11");
    }

    proptest! {
        #[test]
        fn tanker_range_always_tanker(code in 80u32..=89) {
            let classified = classify_ship_type(Some(&RawShipType::Code(code)));
            prop_assert_eq!(classified.category, ShipCategory::Tanker);
        }

        #[test]
        fn codes_outside_table_are_other(code in 90u32..10_000) {
            let classified = classify_ship_type(Some(&RawShipType::Code(code)));
            prop_assert_eq!(classified.category, ShipCategory::Other);
        }

        #[test]
        fn text_classification_never_panics(text in ".*") {
            let _ = classify_ship_type(Some(&RawShipType::Text(text)));
        }
    }
}
