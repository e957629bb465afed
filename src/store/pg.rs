//! PostgreSQL reading store.
//!
//! Records live in a single `readings` table with a `BIGSERIAL` key, so ids
//! are decimal and increase with creation. The sync `postgres` client runs
//! on tokio's blocking pool.
//!
//! Writes made by other processes are not signalled here; subscriptions pick
//! them up on their refresh timer.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use postgres::{Client, NoTls};
use std::env;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::logging::{self, Component};
use crate::model::{NewReading, PersistedReading, StoreError};
use crate::store::ReadingStore;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS readings (
        id               BIGSERIAL PRIMARY KEY,
        temperature      DOUBLE PRECISION,
        tds              DOUBLE PRECISION,
        turbidity        DOUBLE PRECISION,
        dissolved_oxygen DOUBLE PRECISION,
        ph               DOUBLE PRECISION,
        pollution_label  TEXT,
        source           TEXT,
        recorded_at      TIMESTAMPTZ
    )
";

pub struct PgStore {
    client: Arc<Mutex<Option<Client>>>,
    version: watch::Sender<u64>,
    description: String,
}

impl PgStore {
    /// Connects and creates the `readings` table if it is missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let url = database_url.to_string();
        let client = tokio::task::spawn_blocking(move || -> Result<Client, StoreError> {
            let mut client =
                Client::connect(&url, NoTls).map_err(|e| StoreError::Connection(e.to_string()))?;
            client
                .batch_execute(SCHEMA)
                .map_err(|e| StoreError::Connection(format!("schema setup failed: {}", e)))?;
            Ok(client)
        })
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))??;

        let (version, _) = watch::channel(0);
        let description = describe_url(database_url);
        logging::info(Component::Store, Some(&description), "connected to PostgreSQL");

        Ok(Self {
            client: Arc::new(Mutex::new(Some(client))),
            version,
            description,
        })
    }

    /// Connects using `DATABASE_URL`, loading `.env` first if present.
    pub async fn from_env() -> Result<Self, StoreError> {
        dotenv::dotenv().ok();
        let url = env::var("DATABASE_URL")
            .map_err(|_| StoreError::Connection("DATABASE_URL must be set".to_string()))?;
        Self::connect(&url).await
    }

    /// Runs `op` against the client on the blocking pool.
    async fn run<T, F>(&self, wrap: fn(String) -> StoreError, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Client) -> Result<T, StoreError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            let mut guard = client
                .lock()
                .map_err(|_| wrap("client lock poisoned".to_string()))?;
            let client = guard
                .as_mut()
                .ok_or_else(|| wrap("connection closed".to_string()))?;
            op(client)
        })
        .await
        .map_err(|e| wrap(e.to_string()))?
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

impl Drop for PgStore {
    fn drop(&mut self) {
        // postgres::Client shuts its connection down on an internal runtime,
        // which panics on a tokio worker thread.
        let taken = match self.client.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(client) = taken {
            std::thread::spawn(move || drop(client));
        }
    }
}

#[async_trait]
impl ReadingStore for PgStore {
    async fn insert(&self, record: &NewReading) -> Result<String, StoreError> {
        let record = record.clone();
        let id = self
            .run(StoreError::Write, move |client| {
                let row = client
                    .query_one(
                        "INSERT INTO readings
                            (temperature, tds, turbidity, dissolved_oxygen, ph,
                             pollution_label, source, recorded_at)
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                         RETURNING id",
                        &[
                            &record.reading.temperature,
                            &record.reading.tds,
                            &record.reading.turbidity,
                            &record.reading.dissolved_oxygen,
                            &record.reading.ph,
                            &record.label.as_str(),
                            &record.source,
                            &record.recorded_at,
                        ],
                    )
                    .map_err(|e| StoreError::Write(e.to_string()))?;
                let id: i64 = row.get(0);
                Ok(id.to_string())
            })
            .await?;
        self.bump();
        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let Ok(key) = id.parse::<i64>() else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        let deleted = self
            .run(StoreError::Delete, move |client| {
                client
                    .execute("DELETE FROM readings WHERE id = $1", &[&key])
                    .map_err(|e| StoreError::Delete(e.to_string()))
            })
            .await?;

        if deleted == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.bump();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PersistedReading>, StoreError> {
        self.run(StoreError::Subscribe, |client| {
            let rows = client
                .query(
                    "SELECT id, temperature, tds, turbidity, dissolved_oxygen, ph,
                            pollution_label, source, recorded_at
                     FROM readings",
                    &[],
                )
                .map_err(|e| StoreError::Subscribe(e.to_string()))?;

            Ok(rows
                .into_iter()
                .map(|row| PersistedReading {
                    id: row.get::<_, i64>(0).to_string(),
                    temperature: row.get(1),
                    tds: row.get(2),
                    turbidity: row.get(3),
                    dissolved_oxygen: row.get(4),
                    ph: row.get(5),
                    pollution_label: row.get(6),
                    source: row.get(7),
                    timestamp: row
                        .get::<_, Option<DateTime<Utc>>>(8)
                        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
                })
                .collect())
        })
        .await
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Connection URL with any password masked, for logs.
fn describe_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return "postgres".to_string();
    };
    match rest.rsplit_once('@') {
        Some((credentials, host)) => {
            let user = credentials.split(':').next().unwrap_or_default();
            format!("{}://{}:***@{}", scheme, user, host)
        }
        None => url.to_string(),
    }
}
