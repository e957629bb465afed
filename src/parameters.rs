//! Sensor parameter registry.
//!
//! The single source of truth for the five measured parameters: the key the
//! bridge reports each under, the key it is stored under, and how it is
//! displayed. Other modules should look parameters up here rather than
//! hardcoding keys or units.

use crate::model::{PersistedReading, Reading};

/// Metadata for one measured parameter.
pub struct Parameter {
    /// Field name in the bridge's `/api/data` response.
    pub bridge_key: &'static str,
    /// Field name in the `readings` collection.
    pub record_key: &'static str,
    pub name: &'static str,
    /// Empty for dimensionless parameters (pH).
    pub unit: &'static str,
    /// Range of the dashboard gauge, if the parameter has one.
    pub gauge_range: Option<(f64, f64)>,
}

pub static PARAMETER_REGISTRY: &[Parameter] = &[
    Parameter {
        bridge_key: "temp",
        record_key: "temperature",
        name: "Temperature",
        unit: "°C",
        gauge_range: Some((-10.0, 50.0)),
    },
    Parameter {
        bridge_key: "tds",
        record_key: "tds",
        name: "TDS",
        unit: "ppm",
        gauge_range: None,
    },
    Parameter {
        bridge_key: "ntu",
        record_key: "turbidity",
        name: "Turbidity",
        unit: "NTU",
        gauge_range: None,
    },
    Parameter {
        bridge_key: "do",
        record_key: "dissolvedOxygen",
        name: "Dissolved O2",
        unit: "mg/L",
        gauge_range: None,
    },
    Parameter {
        bridge_key: "pH",
        record_key: "pH",
        name: "pH",
        unit: "",
        gauge_range: None,
    },
];

pub fn all_bridge_keys() -> Vec<&'static str> {
    PARAMETER_REGISTRY.iter().map(|p| p.bridge_key).collect()
}

pub fn find_by_bridge_key(key: &str) -> Option<&'static Parameter> {
    PARAMETER_REGISTRY.iter().find(|p| p.bridge_key == key)
}

/// Two decimals, or `-` when there is no value.
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{:.2}", v),
        _ => "-".to_string(),
    }
}

fn with_unit(value: Option<f64>, unit: &str) -> String {
    let formatted = format_value(value);
    if unit.is_empty() {
        formatted
    } else {
        format!("{} {}", formatted, unit)
    }
}

fn summarize(values: [Option<f64>; 5]) -> String {
    PARAMETER_REGISTRY
        .iter()
        .zip(values)
        .map(|(p, v)| format!("{} {}", p.name, with_unit(v, p.unit)))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// One-line summary of a live reading, in registry order.
pub fn summarize_reading(reading: &Reading) -> String {
    summarize([
        Some(reading.temperature),
        Some(reading.tds),
        Some(reading.turbidity),
        Some(reading.dissolved_oxygen),
        Some(reading.ph),
    ])
}

/// One-line summary of a stored reading; missing values show as `-`.
pub fn summarize_persisted(reading: &PersistedReading) -> String {
    summarize([
        reading.temperature,
        reading.tds,
        reading.turbidity,
        reading.dissolved_oxygen,
        reading.ph,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_covers_every_bridge_field_once() {
        let keys: HashSet<&str> = all_bridge_keys().into_iter().collect();
        assert_eq!(keys.len(), PARAMETER_REGISTRY.len());
        for key in ["temp", "tds", "ntu", "do", "pH"] {
            assert!(keys.contains(key), "registry is missing bridge key {}", key);
        }
    }

    #[test]
    fn test_record_keys_match_stored_schema() {
        let reading = PersistedReading {
            id: "1".to_string(),
            temperature: Some(1.0),
            tds: Some(1.0),
            turbidity: Some(1.0),
            dissolved_oxygen: Some(1.0),
            ph: Some(1.0),
            pollution_label: None,
            source: None,
            timestamp: None,
        };
        let json = serde_json::to_value(&reading).unwrap();
        for p in PARAMETER_REGISTRY {
            assert!(json.get(p.record_key).is_some(), "{} not in stored schema", p.record_key);
        }
    }

    #[test]
    fn test_find_by_bridge_key() {
        assert_eq!(find_by_bridge_key("ntu").map(|p| p.record_key), Some("turbidity"));
        assert!(find_by_bridge_key("humidity").is_none());
    }

    #[test]
    fn test_gauge_ranges_are_ordered() {
        for p in PARAMETER_REGISTRY {
            if let Some((min, max)) = p.gauge_range {
                assert!(min < max, "{} gauge range is inverted", p.name);
            }
        }
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(7.0)), "7.00");
        assert_eq!(format_value(Some(3.14159)), "3.14");
        assert_eq!(format_value(None), "-");
        assert_eq!(format_value(Some(f64::NAN)), "-");
    }

    #[test]
    fn test_summaries() {
        assert_eq!(
            summarize_reading(&Reading::default()),
            "Temperature 0.00 °C | TDS 0.00 ppm | Turbidity 0.00 NTU | Dissolved O2 0.00 mg/L | pH 7.00"
        );
        let sparse: PersistedReading = serde_json::from_str(r#"{"pH": 6.5}"#).unwrap();
        assert_eq!(
            summarize_persisted(&sparse),
            "Temperature - °C | TDS - ppm | Turbidity - NTU | Dissolved O2 - mg/L | pH 6.50"
        );
    }
}
