//! Sensor bridge HTTP client.
//!
//! The bridge is a small HTTP service next to the sensors (an ESP32 or a
//! local proxy) that answers `GET /api/data` with the latest values:
//!
//! ```json
//! { "temp": 24.1, "tds": 180, "ntu": 2.3, "do": 7.8, "pH": 7.1 }
//! ```
//!
//! Every field is optional. Fields that are missing, `null` or non-numeric
//! leave the previous value in place when merged.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::classify::coerce::numeric_value;
use crate::ingest::SensorBridge;
use crate::model::{BridgeError, Reading};

/// Port the bridge listens on.
pub const BRIDGE_PORT: u16 = 5000;

/// Path of the live data endpoint.
pub const BRIDGE_DATA_PATH: &str = "/api/data";

// ============================================================================
// Endpoint
// ============================================================================

/// Where to find the bridge. The host is the machine serving the dashboard;
/// port and path are fixed by the bridge firmware but configurable here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeEndpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl BridgeEndpoint {
    pub fn for_host(host: &str) -> Self {
        Self {
            host: host.to_string(),
            port: BRIDGE_PORT,
            path: BRIDGE_DATA_PATH.to_string(),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Raw response body, before numeric coercion.
#[derive(Debug, Deserialize)]
struct RawBridgeResponse {
    temp: Option<Value>,
    tds: Option<Value>,
    ntu: Option<Value>,
    #[serde(rename = "do")]
    dissolved_oxygen: Option<Value>,
    #[serde(rename = "pH")]
    ph: Option<Value>,
}

/// One poll's worth of values. `None` means "not reported this tick".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BridgePayload {
    pub temp: Option<f64>,
    pub tds: Option<f64>,
    pub ntu: Option<f64>,
    pub dissolved_oxygen: Option<f64>,
    pub ph: Option<f64>,
}

impl BridgePayload {
    /// A payload reporting every field of `reading`.
    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            temp: Some(reading.temperature),
            tds: Some(reading.tds),
            ntu: Some(reading.turbidity),
            dissolved_oxygen: Some(reading.dissolved_oxygen),
            ph: Some(reading.ph),
        }
    }

    /// Bridge keys of the fields this payload reports.
    pub fn reported_keys(&self) -> Vec<&'static str> {
        [
            ("temp", self.temp),
            ("tds", self.tds),
            ("ntu", self.ntu),
            ("do", self.dissolved_oxygen),
            ("pH", self.ph),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|_| key))
        .collect()
    }
}

/// Parses a bridge response body.
///
/// The body must be a JSON object; anything else is a parse error and the
/// tick counts as failed.
pub fn parse_payload(body: &str) -> Result<BridgePayload, BridgeError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| BridgeError::ParseError(e.to_string()))?;

    if !value.is_object() {
        return Err(BridgeError::ParseError(
            "Bridge response is not a JSON object".to_string(),
        ));
    }

    let raw: RawBridgeResponse =
        serde_json::from_value(value).map_err(|e| BridgeError::ParseError(e.to_string()))?;

    let num = |v: Option<Value>| v.as_ref().and_then(numeric_value);
    Ok(BridgePayload {
        temp: num(raw.temp),
        tds: num(raw.tds),
        ntu: num(raw.ntu),
        dissolved_oxygen: num(raw.dissolved_oxygen),
        ph: num(raw.ph),
    })
}

/// Applies a payload on top of the previous reading.
///
/// Reported fields replace their counterpart; unreported fields keep the
/// previous value exactly.
pub fn merge(previous: &Reading, payload: &BridgePayload) -> Reading {
    Reading {
        temperature: payload.temp.unwrap_or(previous.temperature),
        tds: payload.tds.unwrap_or(previous.tds),
        turbidity: payload.ntu.unwrap_or(previous.turbidity),
        dissolved_oxygen: payload.dissolved_oxygen.unwrap_or(previous.dissolved_oxygen),
        ph: payload.ph.unwrap_or(previous.ph),
    }
}

// ============================================================================
// HTTP client
// ============================================================================

/// Polls a real bridge over HTTP.
pub struct HttpBridge {
    client: reqwest::Client,
    url: String,
}

impl HttpBridge {
    /// Builds a client for `endpoint`. Without a timeout, requests wait as
    /// long as the underlying connection allows.
    pub fn new(endpoint: &BridgeEndpoint, timeout: Option<Duration>) -> Result<Self, BridgeError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| BridgeError::Unreachable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            url: endpoint.url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SensorBridge for HttpBridge {
    async fn fetch(&self) -> Result<BridgePayload, BridgeError> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| BridgeError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BridgeError::HttpError(response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BridgeError::Unreachable(e.to_string()))?;

        parse_payload(&body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn prior() -> Reading {
        Reading {
            temperature: 22.0,
            tds: 180.0,
            turbidity: 3.0,
            dissolved_oxygen: 7.5,
            ph: 7.1,
        }
    }

    #[test]
    fn test_endpoint_url_uses_fixed_port_and_path() {
        let endpoint = BridgeEndpoint::for_host("192.168.4.1");
        assert_eq!(endpoint.url(), "http://192.168.4.1:5000/api/data");
    }

    #[test]
    fn test_full_payload_parses_every_field() {
        let p = parse_payload(r#"{"temp": 24.5, "tds": 210, "ntu": 4.2, "do": 6.9, "pH": 7.3}"#)
            .expect("valid payload should parse");
        assert_eq!(p.temp, Some(24.5));
        assert_eq!(p.tds, Some(210.0));
        assert_eq!(p.ntu, Some(4.2));
        assert_eq!(p.dissolved_oxygen, Some(6.9));
        assert_eq!(p.ph, Some(7.3));
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let p = parse_payload(r#"{"tds": "312.5"}"#).unwrap();
        assert_eq!(p.tds, Some(312.5));
    }

    #[test]
    fn test_null_and_garbage_fields_are_unreported() {
        let p = parse_payload(r#"{"temp": null, "ntu": "n/a", "do": true, "extra": 1}"#).unwrap();
        assert_eq!(p, BridgePayload::default());
    }

    #[test]
    fn test_non_object_body_is_a_parse_error() {
        assert!(matches!(parse_payload("[1, 2, 3, 4, 5]"), Err(BridgeError::ParseError(_))));
        assert!(matches!(parse_payload("42"), Err(BridgeError::ParseError(_))));
        assert!(matches!(parse_payload("<html>oops</html>"), Err(BridgeError::ParseError(_))));
        assert!(matches!(parse_payload(""), Err(BridgeError::ParseError(_))));
    }

    #[test]
    fn test_merge_keeps_prior_value_for_missing_fields() {
        let p = parse_payload(r#"{"temp": 25.0, "pH": 6.8}"#).unwrap();
        let merged = merge(&prior(), &p);
        assert_eq!(merged.temperature, 25.0);
        assert_eq!(merged.ph, 6.8);
        assert_eq!(merged.tds, 180.0);
        assert_eq!(merged.turbidity, 3.0);
        assert_eq!(merged.dissolved_oxygen, 7.5);
    }

    #[test]
    fn test_merge_of_empty_payload_is_identity() {
        assert_eq!(merge(&prior(), &BridgePayload::default()), prior());
    }

    #[test]
    fn test_reported_keys_lists_present_fields_in_bridge_order() {
        let p = parse_payload(r#"{"pH": 7.0, "temp": 20.0}"#).unwrap();
        assert_eq!(p.reported_keys(), vec!["temp", "pH"]);
    }

    // --- HttpBridge against a local socket -----------------------------------

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves exactly one HTTP response on a fresh local port.
    async fn serve_once(status: &'static str, body: &'static str) -> BridgeEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        BridgeEndpoint {
            host: "127.0.0.1".to_string(),
            port,
            path: BRIDGE_DATA_PATH.to_string(),
        }
    }

    fn bridge(endpoint: &BridgeEndpoint) -> HttpBridge {
        HttpBridge::new(endpoint, Some(Duration::from_secs(5))).unwrap()
    }

    #[tokio::test]
    async fn test_http_partial_object_is_parsed() {
        let endpoint = serve_once("200 OK", r#"{"temp": 23.5, "pH": "6.9"}"#).await;
        let payload = bridge(&endpoint).fetch().await.expect("fetch failed");
        assert_eq!(
            payload,
            BridgePayload {
                temp: Some(23.5),
                ph: Some(6.9),
                ..BridgePayload::default()
            }
        );
    }

    #[tokio::test]
    async fn test_http_error_status_is_http_error() {
        let endpoint = serve_once("500 Internal Server Error", "sensor fault").await;
        assert_eq!(bridge(&endpoint).fetch().await, Err(BridgeError::HttpError(500)));
    }

    #[tokio::test]
    async fn test_http_html_body_is_parse_error() {
        let endpoint = serve_once("200 OK", "<html>captive portal</html>").await;
        assert!(matches!(
            bridge(&endpoint).fetch().await,
            Err(BridgeError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = BridgeEndpoint {
            host: "127.0.0.1".to_string(),
            port,
            path: BRIDGE_DATA_PATH.to_string(),
        };
        assert!(matches!(
            bridge(&endpoint).fetch().await,
            Err(BridgeError::Unreachable(_))
        ));
    }
}
