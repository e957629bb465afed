//! Service configuration loader.
//!
//! Defines the schema for `aquamon.toml`, loads it from disk, and falls back
//! to defaults for anything missing. Every section and every key is
//! optional; an empty file is a valid configuration.
//!
//! ```toml
//! [bridge]
//! host = "192.168.4.1"
//! poll_interval_ms = 2000
//!
//! [store]
//! backend = "postgres"   # DATABASE_URL comes from the environment / .env
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::acquisition::AcquisitionOptions;
use crate::ingest::bridge::{BRIDGE_DATA_PATH, BRIDGE_PORT, BridgeEndpoint};
use crate::logging::{self, Component, LogLevel};
use crate::notify::DEFAULT_TOAST_MS;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "AQUAMON_CONFIG";

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "aquamon.toml";

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// Poll the HTTP bridge.
    #[default]
    Http,
    /// Replay stored readings as if they were live (no hardware needed).
    Replay,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub mode: BridgeMode,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub poll_interval_ms: u64,
    /// Unset means no timeout beyond the HTTP client's own.
    pub request_timeout_ms: Option<u64>,
    pub sequence_guard: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mode: BridgeMode::Http,
            host: "localhost".to_string(),
            port: BRIDGE_PORT,
            path: BRIDGE_DATA_PATH.to_string(),
            poll_interval_ms: 2000,
            request_timeout_ms: None,
            sequence_guard: false,
        }
    }
}

impl BridgeConfig {
    pub fn endpoint(&self) -> BridgeEndpoint {
        BridgeEndpoint {
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn acquisition_options(&self) -> AcquisitionOptions {
        AcquisitionOptions {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            sequence_guard: self.sequence_guard,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub refresh_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            refresh_interval_ms: 1000,
        }
    }
}

impl StoreConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub console_timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            console_timestamps: false,
        }
    }
}

impl LoggingConfig {
    /// Configured level, `Info` when the name is not recognised.
    pub fn min_level(&self) -> LogLevel {
        LogLevel::parse(&self.level).unwrap_or(LogLevel::Info)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    pub toast_ms: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            toast_ms: DEFAULT_TOAST_MS,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_toml(&content)
    }

    /// The file to load: `$AQUAMON_CONFIG` if set, else `./aquamon.toml`.
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load with default fallback
    ///
    /// A missing file is normal; an unreadable or invalid one is reported
    /// and then ignored.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            logging::info(
                Component::System,
                None,
                &format!("no config at {} - using defaults", path.display()),
            );
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                logging::info(
                    Component::System,
                    None,
                    &format!("loaded config from {}", path.display()),
                );
                config
            }
            Err(e) => {
                logging::warn(Component::System, Some(&path.display().to_string()), &e);
                Self::default()
            }
        }
    }

    /// One-line summary for the startup banner.
    pub fn summary(&self) -> String {
        format!(
            "bridge={} ({:?}, every {} ms) store={:?} log={}",
            self.bridge.endpoint().url(),
            self.bridge.mode,
            self.bridge.poll_interval_ms,
            self.store.backend,
            self.logging.level
        )
    }
}
