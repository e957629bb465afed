/// Integration tests for the acquisition loop, run on paused tokio time.
///
/// These tests verify:
/// 1. Each tick merges reported fields over the previous reading
/// 2. A failed tick flips the connection badge and leaves values alone
/// 3. Stopping discards fetches that are still in flight
/// 4. Overlapping fetches: last to resolve wins, unless the sequence
///    guard is enabled
///
/// Run with: cargo test --test acquisition_loop

use aquamon_service::acquisition::{AcquisitionHandle, AcquisitionOptions, LiveState};
use aquamon_service::ingest::SensorBridge;
use aquamon_service::ingest::bridge::BridgePayload;
use aquamon_service::model::{BridgeError, Reading};

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

type Step = (u64, Result<BridgePayload, BridgeError>);

/// Answers the n-th fetch with the n-th step after its delay. Fetches past
/// the end of the script never resolve.
struct ScriptedBridge {
    steps: Vec<Step>,
    calls: AtomicUsize,
}

impl ScriptedBridge {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SensorBridge for ScriptedBridge {
    async fn fetch(&self) -> Result<BridgePayload, BridgeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.steps.get(n) {
            Some((delay_ms, result)) => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                result.clone()
            }
            None => std::future::pending().await,
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

fn temp_only(temp: f64) -> BridgePayload {
    BridgePayload {
        temp: Some(temp),
        ..BridgePayload::default()
    }
}

fn full() -> BridgePayload {
    BridgePayload::from_reading(&Reading {
        temperature: 22.0,
        tds: 180.0,
        turbidity: 3.0,
        dissolved_oxygen: 7.5,
        ph: 7.2,
    })
}

fn every_two_seconds(sequence_guard: bool) -> AcquisitionOptions {
    AcquisitionOptions {
        interval: Duration::from_millis(2000),
        sequence_guard,
    }
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ---------------------------------------------------------------------------
// Merge and connection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_initial_state_before_first_tick() {
    let bridge = ScriptedBridge::new(vec![]);
    let handle = AcquisitionHandle::start(bridge, every_two_seconds(false));

    let state = handle.current();
    assert_eq!(state, LiveState::default());
    assert_eq!(state.reading.ph, 7.0);
    assert_eq!(state.reading.temperature, 0.0);
    assert!(!state.connected);
}

#[tokio::test(start_paused = true)]
async fn test_partial_payload_merges_over_previous() {
    let bridge = ScriptedBridge::new(vec![(0, Ok(full())), (0, Ok(temp_only(25.5)))]);
    let mut handle = AcquisitionHandle::start(bridge.clone(), every_two_seconds(false));

    advance(100).await;
    assert_eq!(handle.current().reading.tds, 180.0);

    advance(2000).await;
    let state = handle.current();
    assert_eq!(bridge.calls(), 2);
    assert!(state.connected);
    assert_eq!(state.reading.temperature, 25.5);
    assert_eq!(state.reading.tds, 180.0);
    assert_eq!(state.reading.ph, 7.2);
    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn test_failed_tick_disconnects_and_keeps_values() {
    let bridge = ScriptedBridge::new(vec![
        (0, Ok(full())),
        (0, Err(BridgeError::Unreachable("connection refused".to_string()))),
        (0, Ok(temp_only(30.0))),
    ]);
    let mut handle = AcquisitionHandle::start(bridge, every_two_seconds(false));

    advance(100).await;
    let first = handle.current();
    assert!(first.connected);

    advance(2000).await;
    let second = handle.current();
    assert!(!second.connected);
    assert_eq!(second.reading, first.reading);
    assert_eq!(second.last_update, first.last_update);

    advance(2000).await;
    let third = handle.current();
    assert!(third.connected, "next success reconnects immediately");
    assert_eq!(third.reading.temperature, 30.0);
    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_between_ticks() {
    let bridge = ScriptedBridge::new(vec![
        (0, Err(BridgeError::HttpError(500))),
        (0, Err(BridgeError::HttpError(500))),
    ]);
    let mut handle = AcquisitionHandle::start(bridge.clone(), every_two_seconds(false));

    advance(1900).await;
    assert_eq!(bridge.calls(), 1);
    advance(200).await;
    assert_eq!(bridge.calls(), 2);
    handle.stop();
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_result() {
    let bridge = ScriptedBridge::new(vec![(5000, Ok(full()))]);
    let mut handle = AcquisitionHandle::start(bridge.clone(), every_two_seconds(false));

    advance(1000).await;
    assert_eq!(bridge.calls(), 1);
    handle.stop();
    assert!(!handle.is_running());

    advance(10_000).await;
    assert_eq!(bridge.calls(), 1, "no ticks after stop");
    assert_eq!(handle.current(), LiveState::default());
}

#[tokio::test(start_paused = true)]
async fn test_stop_twice_is_harmless() {
    let bridge = ScriptedBridge::new(vec![]);
    let mut handle = AcquisitionHandle::start(bridge, every_two_seconds(false));
    handle.stop();
    handle.stop();
    assert!(!handle.is_running());
}

// ---------------------------------------------------------------------------
// Overlapping fetches
// ---------------------------------------------------------------------------

// Tick 1 (t=0) resolves at t=3000; tick 2 (t=2000) resolves at once.
fn overlapping() -> Arc<ScriptedBridge> {
    ScriptedBridge::new(vec![(3000, Ok(temp_only(1.0))), (0, Ok(temp_only(2.0)))])
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_fetches_last_to_resolve_wins() {
    let mut handle = AcquisitionHandle::start(overlapping(), every_two_seconds(false));

    advance(2500).await;
    assert_eq!(handle.current().reading.temperature, 2.0);

    advance(1000).await;
    assert_eq!(
        handle.current().reading.temperature,
        1.0,
        "the older tick resolved later and overwrote the newer one"
    );
    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn test_sequence_guard_drops_stale_results() {
    let mut handle = AcquisitionHandle::start(overlapping(), every_two_seconds(true));

    advance(3500).await;
    assert_eq!(handle.current().reading.temperature, 2.0);
    handle.stop();
}
