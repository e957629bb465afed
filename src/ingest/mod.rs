//! Live data sources for the acquisition loop.
//!
//! Submodules:
//! - `bridge`: the HTTP sensor bridge (`GET /api/data`) and payload merging.

pub mod bridge;

use async_trait::async_trait;

use crate::model::BridgeError;
use bridge::BridgePayload;

/// A source of live sensor payloads, polled once per acquisition tick.
///
/// Implementations must not retry: a failed fetch is reported as-is and the
/// next tick simply tries again.
#[async_trait]
pub trait SensorBridge: Send + Sync {
    async fn fetch(&self) -> Result<BridgePayload, BridgeError>;

    /// Human-readable description of where payloads come from.
    fn describe(&self) -> String;
}
