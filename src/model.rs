//! Core data types for the water-quality monitoring service.
//!
//! This module defines the shared domain model imported by all other modules.
//! It contains no I/O: only types, their string forms, and the conversions
//! between the live reading and the stored record.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Name of the collection (table) holding persisted readings.
pub const READINGS_COLLECTION: &str = "readings";

/// Display text for a persisted record that carries no pollution label.
pub const UNKNOWN_LABEL: &str = "Unknown";

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// A five-field snapshot of the current sensor values.
///
/// Replaced wholesale on every successful poll tick. Has no identity until
/// it is saved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature: f64,      // °C
    pub tds: f64,              // ppm
    pub turbidity: f64,        // NTU
    pub dissolved_oxygen: f64, // mg/L
    pub ph: f64,
}

impl Default for Reading {
    /// The value shown before the first successful poll: all zero, neutral pH.
    fn default() -> Self {
        Self {
            temperature: 0.0,
            tds: 0.0,
            turbidity: 0.0,
            dissolved_oxygen: 0.0,
            ph: 7.0,
        }
    }
}

impl Reading {
    /// Returns a copy with every NaN field replaced by `0.0`.
    ///
    /// This is the coerce-or-default step applied before classification;
    /// comparisons against NaN would otherwise silently fail every rule.
    pub fn coerced(&self) -> Reading {
        let or_zero = |v: f64| if v.is_nan() { 0.0 } else { v };
        Reading {
            temperature: or_zero(self.temperature),
            tds: or_zero(self.tds),
            turbidity: or_zero(self.turbidity),
            dissolved_oxygen: or_zero(self.dissolved_oxygen),
            ph: or_zero(self.ph),
        }
    }
}

/// A reading as stored in the `readings` collection.
///
/// Serializes to the collection's JSON schema. The `id` is the store key and
/// is not part of the stored body. Every body field is optional on read so
/// that records written by other clients (including the legacy `temp`,
/// `ntu`, `do` and `label` field names) still load; records written by this
/// service always carry every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedReading {
    #[serde(skip)]
    pub id: String,
    #[serde(alias = "temp", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tds: Option<f64>,
    #[serde(alias = "ntu", skip_serializing_if = "Option::is_none")]
    pub turbidity: Option<f64>,
    #[serde(alias = "do", skip_serializing_if = "Option::is_none")]
    pub dissolved_oxygen: Option<f64>,
    #[serde(rename = "pH", skip_serializing_if = "Option::is_none")]
    pub ph: Option<f64>,
    #[serde(alias = "label", skip_serializing_if = "Option::is_none")]
    pub pollution_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>, // ISO 8601, e.g. "2024-05-01T12:00:00.000Z"
}

impl PersistedReading {
    /// The label to show for this record, `Unknown` when none was stored.
    pub fn label_display(&self) -> &str {
        match self.pollution_label.as_deref() {
            Some(label) if !label.is_empty() => label,
            _ => UNKNOWN_LABEL,
        }
    }

    /// The source to show for this record, `Unknown` when none was stored.
    pub fn source_display(&self) -> &str {
        match self.source.as_deref() {
            Some(source) if !source.is_empty() => source,
            _ => UNKNOWN_LABEL,
        }
    }
}

/// A reading about to be appended to the store: the live reading at save
/// time plus its label, the user-supplied source and the save timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub reading: Reading,
    pub label: PollutionLabel,
    pub source: String,
    pub recorded_at: DateTime<Utc>,
}

impl NewReading {
    /// Timestamp in the stored form: RFC 3339, millisecond precision, `Z`.
    pub fn timestamp(&self) -> String {
        self.recorded_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Builds the stored form of this reading under the given store key.
    pub fn into_persisted(self, id: String) -> PersistedReading {
        let timestamp = self.timestamp();
        PersistedReading {
            id,
            temperature: Some(self.reading.temperature),
            tds: Some(self.reading.tds),
            turbidity: Some(self.reading.turbidity),
            dissolved_oxygen: Some(self.reading.dissolved_oxygen),
            ph: Some(self.reading.ph),
            pollution_label: Some(self.label.as_str().to_string()),
            source: Some(self.source),
            timestamp: Some(timestamp),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification labels
// ---------------------------------------------------------------------------

/// The closed set of pollution categories the classifier can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollutionLabel {
    GoodWater,
    Sewage,
    AgriculturalRunoff,
    ChemicalIntrusion,
    ThermalPollution,
}

impl PollutionLabel {
    pub const ALL: [PollutionLabel; 5] = [
        PollutionLabel::GoodWater,
        PollutionLabel::Sewage,
        PollutionLabel::AgriculturalRunoff,
        PollutionLabel::ChemicalIntrusion,
        PollutionLabel::ThermalPollution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PollutionLabel::GoodWater => "Good Water",
            PollutionLabel::Sewage => "Sewage",
            PollutionLabel::AgriculturalRunoff => "Agricultural Runoff",
            PollutionLabel::ChemicalIntrusion => "Chemical Intrusion",
            PollutionLabel::ThermalPollution => "Thermal Pollution",
        }
    }
}

impl fmt::Display for PollutionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollutionLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PollutionLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| format!("Unrecognised pollution label: {}", s))
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors from a single sensor bridge poll. All of them mean "network
/// unavailable" for the tick: the reading is left alone and the connection
/// flag drops.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Non-2xx HTTP response from the bridge.
    HttpError(u16),
    /// The body was not a JSON object.
    ParseError(String),
    /// The request never produced a response (connect, DNS, timeout).
    Unreachable(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::HttpError(code) => write!(f, "HTTP error: {}", code),
            BridgeError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            BridgeError::Unreachable(msg) => write!(f, "Bridge unreachable: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {}

/// Errors from the reading store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The backend could not be reached or opened.
    Connection(String),
    /// An append failed.
    Write(String),
    /// A delete failed in transit.
    Delete(String),
    /// A delete named an id the store does not hold.
    NotFound(String),
    /// A subscription could not load the collection.
    Subscribe(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connection(msg) => write!(f, "Store connection error: {}", msg),
            StoreError::Write(msg) => write!(f, "Store write error: {}", msg),
            StoreError::Delete(msg) => write!(f, "Store delete error: {}", msg),
            StoreError::NotFound(id) => write!(f, "No reading with id: {}", id),
            StoreError::Subscribe(msg) => write!(f, "Store subscribe error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// A save attempted without its preconditions. No I/O happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    NotClassified,
    MissingSource,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NotClassified => write!(f, "Please classify before saving"),
            ValidationError::MissingSource => write!(f, "Please enter water source"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// The failure of a user action at the controller boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionError {
    Validation(ValidationError),
    Store(StoreError),
    /// The same action is already in flight.
    Busy,
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionError::Validation(e) => write!(f, "{}", e),
            ActionError::Store(e) => write!(f, "{}", e),
            ActionError::Busy => write!(f, "Action already in progress"),
        }
    }
}

impl std::error::Error for ActionError {}

impl From<ValidationError> for ActionError {
    fn from(e: ValidationError) -> Self {
        ActionError::Validation(e)
    }
}

impl From<StoreError> for ActionError {
    fn from(e: StoreError) -> Self {
        ActionError::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_reading_is_neutral_ph() {
        let r = Reading::default();
        assert_eq!(r.ph, 7.0);
        assert_eq!(r.temperature, 0.0);
        assert_eq!(r.dissolved_oxygen, 0.0);
    }

    #[test]
    fn test_coerced_replaces_only_nan() {
        let r = Reading {
            temperature: f64::NAN,
            tds: 120.0,
            turbidity: f64::NAN,
            dissolved_oxygen: 8.0,
            ph: 7.2,
        };
        let c = r.coerced();
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.turbidity, 0.0);
        assert_eq!(c.tds, 120.0);
        assert_eq!(c.ph, 7.2);
    }

    #[test]
    fn test_label_round_trips_through_its_display_name() {
        for label in PollutionLabel::ALL {
            assert_eq!(label.as_str().parse::<PollutionLabel>(), Ok(label));
        }
        assert!("Unknown".parse::<PollutionLabel>().is_err());
    }

    #[test]
    fn test_new_reading_timestamp_is_iso_with_millis() {
        let new = NewReading {
            reading: Reading::default(),
            label: PollutionLabel::Sewage,
            source: "lake".to_string(),
            recorded_at: Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap(),
        };
        assert_eq!(new.timestamp(), "2024-05-01T13:00:00.000Z");
    }

    #[test]
    fn test_persisted_reading_serializes_to_collection_schema() {
        let new = NewReading {
            reading: Reading {
                temperature: 21.5,
                tds: 150.0,
                turbidity: 2.0,
                dissolved_oxygen: 8.1,
                ph: 7.4,
            },
            label: PollutionLabel::GoodWater,
            source: "tap".to_string(),
            recorded_at: Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(new.into_persisted("0001".to_string())).unwrap();

        assert_eq!(json["dissolvedOxygen"], 8.1);
        assert_eq!(json["pH"], 7.4);
        assert_eq!(json["pollutionLabel"], "Good Water");
        assert_eq!(json["timestamp"], "2024-05-01T13:00:00.000Z");
        assert!(json.get("id").is_none(), "id is the store key, not part of the body");
    }

    #[test]
    fn test_legacy_field_names_are_accepted_on_read() {
        let body = r#"{"temp": 19.0, "ntu": 3.5, "do": 6.0, "label": "Sewage", "source": "well"}"#;
        let r: PersistedReading = serde_json::from_str(body).unwrap();
        assert_eq!(r.temperature, Some(19.0));
        assert_eq!(r.turbidity, Some(3.5));
        assert_eq!(r.dissolved_oxygen, Some(6.0));
        assert_eq!(r.label_display(), "Sewage");
        assert_eq!(r.tds, None);
    }

    #[test]
    fn test_missing_label_and_source_display_as_unknown() {
        let r: PersistedReading = serde_json::from_str("{}").unwrap();
        assert_eq!(r.label_display(), UNKNOWN_LABEL);
        assert_eq!(r.source_display(), UNKNOWN_LABEL);
    }

    #[test]
    fn test_validation_messages_match_user_facing_text() {
        assert_eq!(ValidationError::NotClassified.to_string(), "Please classify before saving");
        assert_eq!(ValidationError::MissingSource.to_string(), "Please enter water source");
    }
}
