//! Acquisition loop: keeps the live reading approximately fresh.
//!
//! Every tick issues one fetch against the sensor bridge. A successful fetch
//! is merged into the current reading and marks the bridge connected; any
//! failure leaves the reading untouched and marks it disconnected. There is
//! no retry and no backoff: the next tick is the retry.
//!
//! Each tick's fetch runs as its own task, so a slow bridge can have several
//! requests in flight. Without the sequence guard the last one to resolve
//! wins, even if it was issued earlier.
//!
//! # Clock injection
//! `apply_poll_result` takes `now` explicitly so merge behaviour is testable
//! without a running loop.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ingest::SensorBridge;
use crate::ingest::bridge::{BridgePayload, merge};
use crate::logging::{self, Component};
use crate::model::{BridgeError, Reading};

/// Default period between poll ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

// ---------------------------------------------------------------------------
// Live state
// ---------------------------------------------------------------------------

/// The reading and connection flag owned by the acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveState {
    pub reading: Reading,
    /// Result of the most recent tick to resolve. No history, no decay.
    pub connected: bool,
    /// When the most recent successful tick was applied.
    pub last_update: Option<DateTime<Utc>>,
}

impl Default for LiveState {
    fn default() -> Self {
        Self {
            reading: Reading::default(),
            connected: false,
            last_update: None,
        }
    }
}

/// Applies one tick's outcome to the live state.
///
/// Success merges the payload over the current reading; failure changes
/// nothing but the connection flag.
pub fn apply_poll_result(
    state: &mut LiveState,
    result: &Result<BridgePayload, BridgeError>,
    now: DateTime<Utc>,
) {
    match result {
        Ok(payload) => {
            state.reading = merge(&state.reading, payload);
            state.connected = true;
            state.last_update = Some(now);
        }
        Err(_) => {
            state.connected = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct AcquisitionOptions {
    pub interval: Duration,
    /// Drop results from ticks older than the newest one already applied.
    pub sequence_guard: bool,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            sequence_guard: false,
        }
    }
}

struct Shared {
    state: watch::Sender<LiveState>,
    stopped: AtomicBool,
    newest_applied: AtomicU64,
    sequence_guard: bool,
    endpoint: String,
}

impl Shared {
    fn apply(&self, seq: u64, result: Result<BridgePayload, BridgeError>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        if self.sequence_guard {
            let newest = self.newest_applied.fetch_max(seq, Ordering::AcqRel);
            if newest > seq {
                logging::debug(
                    Component::Bridge,
                    Some(&self.endpoint),
                    &format!("dropping result of tick {} (tick {} already applied)", seq, newest),
                );
                return;
            }
        }

        if let Err(ref e) = result {
            logging::log_bridge_failure(&self.endpoint, e);
        }

        let was_connected = self.state.borrow().connected;
        let now = Utc::now();
        // `stop` may have landed since the check above.
        let applied = self.state.send_if_modified(|state| {
            if self.stopped.load(Ordering::Acquire) {
                return false;
            }
            apply_poll_result(state, &result, now);
            true
        });
        if !applied {
            return;
        }

        match (was_connected, result.is_ok()) {
            (false, true) => logging::info(Component::Bridge, Some(&self.endpoint), "bridge connected"),
            (true, false) => logging::warn(Component::Bridge, Some(&self.endpoint), "bridge connection lost"),
            _ => {}
        }
    }
}

/// Running acquisition loop. Dropping the handle stops it.
pub struct AcquisitionHandle {
    shared: Arc<Shared>,
    timer: Option<JoinHandle<()>>,
}

impl AcquisitionHandle {
    /// Starts polling `bridge`. The first tick fires immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(bridge: Arc<dyn SensorBridge>, options: AcquisitionOptions) -> Self {
        Self::start_from(bridge, options, LiveState::default())
    }

    /// Starts polling with a given initial state.
    pub fn start_from(
        bridge: Arc<dyn SensorBridge>,
        options: AcquisitionOptions,
        initial: LiveState,
    ) -> Self {
        let (state, _) = watch::channel(initial);
        let shared = Arc::new(Shared {
            state,
            stopped: AtomicBool::new(false),
            newest_applied: AtomicU64::new(0),
            sequence_guard: options.sequence_guard,
            endpoint: bridge.describe(),
        });

        logging::info(
            Component::Bridge,
            Some(&shared.endpoint),
            &format!("polling every {} ms", options.interval.as_millis()),
        );

        let timer_shared = Arc::clone(&shared);
        let timer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(options.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut seq: u64 = 0;
            loop {
                ticker.tick().await;
                if timer_shared.stopped.load(Ordering::Acquire) {
                    break;
                }
                seq += 1;
                let tick = seq;
                let bridge = Arc::clone(&bridge);
                let shared = Arc::clone(&timer_shared);
                tokio::spawn(async move {
                    let result = bridge.fetch().await;
                    shared.apply(tick, result);
                });
            }
        });

        Self {
            shared,
            timer: Some(timer),
        }
    }

    /// Snapshot of the live reading and connection flag.
    pub fn current(&self) -> LiveState {
        *self.shared.state.borrow()
    }

    /// Receiver notified after every applied tick.
    pub fn subscribe(&self) -> watch::Receiver<LiveState> {
        self.shared.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Stops scheduling ticks. Fetches already in flight are left to finish
    /// and their results are discarded. Calling it again does nothing.
    pub fn stop(&mut self) {
        // Set under the state's write lock so no result lands after this.
        self.shared.state.send_if_modified(|_| {
            self.shared.stopped.store(true, Ordering::Release);
            false
        });
        if let Some(timer) = self.timer.take() {
            timer.abort();
            logging::info(Component::Bridge, Some(&self.shared.endpoint), "polling stopped");
        }
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
