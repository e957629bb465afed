//! Reading store client.
//!
//! A thin contract over a keyed, append-only, subscribable store of
//! persisted readings:
//!
//! - `append` writes a new record under a fresh store-generated id,
//! - `subscribe` streams the full collection, newest first, on every change,
//! - `remove` deletes one record by id.
//!
//! There is no update operation. Filtering is never pushed to the store.
//!
//! Submodules:
//! - `memory`: in-process backend for development and tests.
//! - `pg`: PostgreSQL backend (`readings` table).

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::logging::{self, Component};
use crate::model::{NewReading, PersistedReading, StoreError};

/// How often a subscription re-reads the collection to pick up writes made
/// by other processes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(1000);

// ---------------------------------------------------------------------------
// Backend capability
// ---------------------------------------------------------------------------

/// A place readings are kept.
///
/// Ids must be unique and ordered by creation under `creation_order`.
/// `list` may return records in any order.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn insert(&self, record: &NewReading) -> Result<String, StoreError>;

    /// Fails with `StoreError::NotFound` when no record has this id.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<PersistedReading>, StoreError>;

    /// A counter bumped after every write made through this backend.
    fn changes(&self) -> watch::Receiver<u64>;

    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Orders two store ids by creation: shorter ids first, then
/// lexicographically. Holds for decimal counters and for fixed-width
/// time-prefixed keys alike.
pub fn creation_order(a: &str, b: &str) -> CmpOrdering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Sorts records newest first.
pub fn newest_first(mut records: Vec<PersistedReading>) -> Vec<PersistedReading> {
    records.sort_by(|a, b| creation_order(&b.id, &a.id));
    records
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Cloneable handle over a shared backend.
#[derive(Clone)]
pub struct ReadingStoreClient {
    backend: Arc<dyn ReadingStore>,
    refresh_interval: Duration,
}

impl ReadingStoreClient {
    pub fn new(backend: Arc<dyn ReadingStore>, refresh_interval: Duration) -> Self {
        Self {
            backend,
            refresh_interval,
        }
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// Appends a record and returns its new id. Never retries.
    pub async fn append(&self, record: &NewReading) -> Result<String, StoreError> {
        let result = self.backend.insert(record).await.map_err(|e| match e {
            StoreError::Write(_) => e,
            other => StoreError::Write(other.to_string()),
        });

        match &result {
            Ok(id) => logging::debug(
                Component::Store,
                Some(id),
                &format!("appended reading from '{}'", record.source),
            ),
            Err(e) => logging::log_store_failure(None, "append", e),
        }
        result
    }

    /// Deletes the record with `id`.
    ///
    /// `NotFound` when the id is unknown, `Delete` when the call itself failed.
    pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let result = self.backend.delete(id).await.map_err(|e| match e {
            StoreError::Delete(_) | StoreError::NotFound(_) => e,
            other => StoreError::Delete(other.to_string()),
        });

        match &result {
            Ok(()) => logging::debug(Component::Store, Some(id), "removed reading"),
            Err(e) => logging::log_store_failure(Some(id), "remove", e),
        }
        result
    }

    /// One-off read of the whole collection, newest first.
    pub async fn snapshot(&self) -> Result<Vec<PersistedReading>, StoreError> {
        self.backend.list().await.map(newest_first)
    }

    /// Streams the collection to `on_change`, newest first.
    ///
    /// The current collection is always delivered once, even when empty.
    /// After that `on_change` runs only when the collection differs from the
    /// last delivery. If the backend fails, `on_error` runs once with a
    /// `StoreError::Subscribe` and the subscription ends.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<F, E>(&self, mut on_change: F, on_error: E) -> Subscription
    where
        F: FnMut(Vec<PersistedReading>) + Send + 'static,
        E: FnOnce(StoreError) + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let backend = Arc::clone(&self.backend);
        let refresh_interval = self.refresh_interval;
        let task_active = Arc::clone(&active);

        let task = tokio::spawn(async move {
            let mut changes = backend.changes();
            let mut watching = true;
            let mut refresh = tokio::time::interval(refresh_interval);
            refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
            refresh.tick().await;

            let mut delivered: Option<Vec<PersistedReading>> = None;
            let failure = loop {
                match backend.list().await {
                    Ok(records) => {
                        let ordered = newest_first(records);
                        if delivered.as_ref() != Some(&ordered) {
                            if !task_active.load(Ordering::Acquire) {
                                return;
                            }
                            on_change(ordered.clone());
                            delivered = Some(ordered);
                        }
                    }
                    Err(e) => {
                        break match e {
                            StoreError::Subscribe(_) => e,
                            other => StoreError::Subscribe(other.to_string()),
                        };
                    }
                }

                tokio::select! {
                    changed = changes.changed(), if watching => {
                        if changed.is_err() {
                            // Backend went away; keep going on the refresh timer.
                            watching = false;
                        }
                    }
                    _ = refresh.tick() => {}
                }
            };

            logging::log_store_failure(None, "subscribe", &failure);
            if task_active.swap(false, Ordering::AcqRel) {
                on_error(failure);
            }
        });

        Subscription {
            active,
            task: Some(task),
        }
    }
}

/// Live subscription. `unsubscribe` consumes it; dropping it unsubscribes too.
pub struct Subscription {
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// `false` once unsubscribed or ended by an error.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
