//! Startup Verification Module
//!
//! Checks the configured sensor bridge and reading store before the
//! controllers are mounted, and reports which of them are usable.
//!
//! Nothing here is fatal: a bridge that is switched off or a store that is
//! unreachable is reported, and the service starts anyway.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ingest::SensorBridge;
use crate::parameters::all_bridge_keys;
use crate::store::ReadingStoreClient;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub bridge: BridgeVerification,
    pub store: StoreVerification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeVerification {
    pub endpoint: String,
    pub status: VerificationStatus,
    pub responsive: bool,
    pub parameters_available: Vec<String>,
    pub parameters_missing: Vec<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreVerification {
    pub backend: String,
    pub status: VerificationStatus,
    pub record_count: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl VerificationReport {
    /// Worst of the two statuses.
    pub fn overall(&self) -> VerificationStatus {
        use VerificationStatus::*;
        match (self.bridge.status, self.store.status) {
            (Success, Success) => Success,
            (Failed, Failed) => Failed,
            _ => PartialSuccess,
        }
    }
}

// ============================================================================
// Bridge Verification
// ============================================================================

/// Polls the bridge once and checks which parameters it reports.
///
/// All five reported is a success; some reported is partial; an error or an
/// empty object is a failure.
pub async fn verify_bridge(bridge: &dyn SensorBridge) -> BridgeVerification {
    let mut result = BridgeVerification {
        endpoint: bridge.describe(),
        status: VerificationStatus::Failed,
        responsive: false,
        parameters_available: Vec::new(),
        parameters_missing: Vec::new(),
        error_message: None,
    };

    match bridge.fetch().await {
        Ok(payload) => {
            result.responsive = true;
            let reported = payload.reported_keys();
            for key in all_bridge_keys() {
                if reported.contains(&key) {
                    result.parameters_available.push(key.to_string());
                } else {
                    result.parameters_missing.push(key.to_string());
                }
            }

            result.status = if result.parameters_missing.is_empty() {
                VerificationStatus::Success
            } else if !result.parameters_available.is_empty() {
                VerificationStatus::PartialSuccess
            } else {
                result.error_message = Some("Bridge reported no parameters".to_string());
                VerificationStatus::Failed
            };
        }
        Err(e) => {
            result.error_message = Some(e.to_string());
            result.parameters_missing = all_bridge_keys().iter().map(|k| k.to_string()).collect();
        }
    }

    result
}

// ============================================================================
// Store Verification
// ============================================================================

/// Lists the store once. An empty store is still a success.
pub async fn verify_store(store: &ReadingStoreClient) -> StoreVerification {
    let mut result = StoreVerification {
        backend: store.describe(),
        status: VerificationStatus::Failed,
        record_count: 0,
        error_message: None,
    };

    match store.snapshot().await {
        Ok(records) => {
            result.record_count = records.len();
            result.status = VerificationStatus::Success;
        }
        Err(e) => {
            result.error_message = Some(e.to_string());
        }
    }

    result
}

// ============================================================================
// Main Verification Function
// ============================================================================

pub async fn run_verification(
    bridge: &dyn SensorBridge,
    store: &ReadingStoreClient,
) -> VerificationReport {
    let bridge = verify_bridge(bridge).await;
    let store = verify_store(store).await;

    VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        bridge,
        store,
    }
}

fn status_line(status: VerificationStatus, detail: &str, error: Option<&str>) -> String {
    match status {
        VerificationStatus::Success => format!("✓ OK ({})", detail),
        VerificationStatus::PartialSuccess => format!("⚠ Partial ({})", detail),
        VerificationStatus::Failed => format!("✗ FAILED: {}", error.unwrap_or("Unknown")),
    }
}

pub fn print_summary(report: &VerificationReport) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("VERIFICATION SUMMARY");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    let bridge_detail = if report.bridge.parameters_missing.is_empty() {
        format!("{} parameters", report.bridge.parameters_available.len())
    } else {
        format!("missing: {}", report.bridge.parameters_missing.join(", "))
    };
    println!(
        "Sensor bridge:  {}  {}",
        report.bridge.endpoint,
        status_line(
            report.bridge.status,
            &bridge_detail,
            report.bridge.error_message.as_deref()
        )
    );
    println!(
        "Reading store:  {}  {}",
        report.store.backend,
        status_line(
            report.store.status,
            &format!("{} readings", report.store.record_count),
            report.store.error_message.as_deref()
        )
    );
    println!();
    println!("Overall: {:?}", report.overall());
    println!("═══════════════════════════════════════════════════════════");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev_mode::ReplayBridge;
    use crate::ingest::bridge::BridgePayload;
    use crate::model::Reading;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_full_payload_is_success() {
        let bridge = ReplayBridge::from_readings(&[Reading::default()]);
        let result = verify_bridge(&bridge).await;
        assert_eq!(result.status, VerificationStatus::Success);
        assert_eq!(result.parameters_available.len(), 5);
        assert!(result.parameters_missing.is_empty());
    }

    #[tokio::test]
    async fn test_partial_payload_lists_missing() {
        let payload = BridgePayload {
            temp: Some(20.0),
            ph: Some(7.0),
            ..BridgePayload::default()
        };
        let bridge = ReplayBridge::new(vec![payload], "fixture");
        let result = verify_bridge(&bridge).await;
        assert_eq!(result.status, VerificationStatus::PartialSuccess);
        assert_eq!(result.parameters_missing, vec!["tds", "ntu", "do"]);
    }

    #[tokio::test]
    async fn test_unreachable_bridge_fails() {
        let bridge = ReplayBridge::new(Vec::new(), "empty");
        let result = verify_bridge(&bridge).await;
        assert_eq!(result.status, VerificationStatus::Failed);
        assert!(!result.responsive);
        assert!(result.error_message.is_some());
    }

    #[tokio::test]
    async fn test_empty_store_is_success() {
        let store = ReadingStoreClient::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        let result = verify_store(&store).await;
        assert_eq!(result.status, VerificationStatus::Success);
        assert_eq!(result.record_count, 0);
    }

    #[tokio::test]
    async fn test_overall_is_partial_when_only_bridge_fails() {
        let bridge = ReplayBridge::new(Vec::new(), "empty");
        let store = ReadingStoreClient::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        let report = run_verification(&bridge, &store).await;
        assert_eq!(report.overall(), VerificationStatus::PartialSuccess);
        assert!(serde_json::to_string(&report).is_ok());
    }
}
