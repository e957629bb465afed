//! Development mode: replay recorded readings as if a bridge were attached.
//!
//! When no sensor board is on the network, use this module to feed the
//! acquisition loop from readings already in the store (or any fixed list).

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ingest::SensorBridge;
use crate::ingest::bridge::BridgePayload;
use crate::model::{BridgeError, PersistedReading, Reading};

/// A `SensorBridge` that cycles through a fixed list of payloads.
pub struct ReplayBridge {
    payloads: Vec<BridgePayload>,
    cursor: AtomicUsize,
    label: String,
}

impl ReplayBridge {
    pub fn new(payloads: Vec<BridgePayload>, label: &str) -> Self {
        Self {
            payloads,
            cursor: AtomicUsize::new(0),
            label: label.to_string(),
        }
    }

    /// Replays complete readings in the given order.
    pub fn from_readings(readings: &[Reading]) -> Self {
        Self::new(
            readings.iter().map(BridgePayload::from_reading).collect(),
            "readings",
        )
    }

    /// Replays stored records oldest first.
    ///
    /// `records` is expected newest first, as the store client returns them.
    /// Fields a record lacks are left unreported, so the live reading keeps
    /// its previous value for them.
    pub fn from_records(records: &[PersistedReading]) -> Self {
        let payloads = records
            .iter()
            .rev()
            .map(|r| BridgePayload {
                temp: r.temperature,
                tds: r.tds,
                ntu: r.turbidity,
                dissolved_oxygen: r.dissolved_oxygen,
                ph: r.ph,
            })
            .collect();
        Self::new(payloads, "store")
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

#[async_trait]
impl SensorBridge for ReplayBridge {
    async fn fetch(&self) -> Result<BridgePayload, BridgeError> {
        if self.payloads.is_empty() {
            // Behaves like a bridge that is switched off.
            return Err(BridgeError::Unreachable("nothing to replay".to_string()));
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.payloads.len();
        Ok(self.payloads[i])
    }

    fn describe(&self) -> String {
        format!("replay:{} ({} readings)", self.label, self.payloads.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, temp: Option<f64>) -> PersistedReading {
        PersistedReading {
            id: id.to_string(),
            temperature: temp,
            tds: Some(100.0),
            turbidity: None,
            dissolved_oxygen: None,
            ph: Some(7.0),
            pollution_label: None,
            source: None,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_replay_cycles_in_order() {
        let bridge = ReplayBridge::from_readings(&[
            Reading { temperature: 1.0, ..Reading::default() },
            Reading { temperature: 2.0, ..Reading::default() },
        ]);
        let temps: Vec<Option<f64>> = [
            bridge.fetch().await.unwrap(),
            bridge.fetch().await.unwrap(),
            bridge.fetch().await.unwrap(),
        ]
        .iter()
        .map(|p| p.temp)
        .collect();
        assert_eq!(temps, vec![Some(1.0), Some(2.0), Some(1.0)]);
    }

    #[tokio::test]
    async fn test_records_replay_oldest_first() {
        // Newest first, as the store client delivers them.
        let records = vec![record("2", Some(20.0)), record("1", Some(10.0))];
        let bridge = ReplayBridge::from_records(&records);
        assert_eq!(bridge.fetch().await.unwrap().temp, Some(10.0));
        assert_eq!(bridge.fetch().await.unwrap().temp, Some(20.0));
    }

    #[tokio::test]
    async fn test_missing_record_fields_stay_unreported() {
        let bridge = ReplayBridge::from_records(&[record("1", None)]);
        let payload = bridge.fetch().await.unwrap();
        assert_eq!(payload.reported_keys(), vec!["tds", "pH"]);
    }

    #[tokio::test]
    async fn test_empty_replay_is_unreachable() {
        let bridge = ReplayBridge::from_readings(&[]);
        assert!(bridge.is_empty());
        assert!(matches!(bridge.fetch().await, Err(BridgeError::Unreachable(_))));
    }
}
