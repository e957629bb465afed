//! In-process reading store.
//!
//! Keeps records in a hash map (so `list` order is arbitrary, like a real
//! remote store) and hands out decimal ids from a counter. Used for
//! development without a database and as the backend in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

use crate::model::{NewReading, PersistedReading, StoreError};
use crate::store::ReadingStore;

struct Inner {
    next_id: u64,
    records: HashMap<String, PersistedReading>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    version: watch::Sender<u64>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                records: HashMap::new(),
            }),
            version,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Connection("memory store lock poisoned".to_string()))
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    /// Stores a body written elsewhere (possibly partial or using legacy
    /// field names) under a fresh id.
    pub fn import(&self, body: PersistedReading) -> Result<String, StoreError> {
        let id = {
            let mut inner = self.lock()?;
            let id = inner.next_id.to_string();
            inner.next_id += 1;
            inner.records.insert(id.clone(), PersistedReading { id: id.clone(), ..body });
            id
        };
        self.bump();
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn insert(&self, record: &NewReading) -> Result<String, StoreError> {
        let id = {
            let mut inner = self.lock().map_err(|e| StoreError::Write(e.to_string()))?;
            let id = inner.next_id.to_string();
            inner.next_id += 1;
            inner
                .records
                .insert(id.clone(), record.clone().into_persisted(id.clone()));
            id
        };
        self.bump();
        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let removed = {
            let mut inner = self.lock().map_err(|e| StoreError::Delete(e.to_string()))?;
            inner.records.remove(id)
        };
        match removed {
            Some(_) => {
                self.bump();
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<PersistedReading>, StoreError> {
        let inner = self.lock().map_err(|e| StoreError::Subscribe(e.to_string()))?;
        Ok(inner.records.values().cloned().collect())
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
