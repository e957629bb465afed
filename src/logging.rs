//! Structured logging for the water-quality monitoring service
//!
//! Provides context-rich logging with component tags, an optional subject
//! (an endpoint, a record id, a water source), timestamps, and severity
//! levels. Supports both console output and file-based logging for daemon
//! operation.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::model::{BridgeError, StoreError};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Parses a configuration level name (`debug`, `info`, `warn`, `error`).
    pub fn parse(name: &str) -> Option<LogLevel> {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Bridge,
    Store,
    Dashboard,
    History,
    Manual,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Bridge => write!(f, "BRIDGE"),
            Component::Store => write!(f, "STORE"),
            Component::Dashboard => write!(f, "DASH"),
            Component::History => write!(f, "HIST"),
            Component::Manual => write!(f, "TEST"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - bridge powered off, out of range, record already gone
    Expected,
    /// Unexpected failure - indicates firmware, schema or configuration trouble
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        // A poisoned lock only means an earlier log call panicked mid-write.
        let mut slot = LOGGER.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(logger);
    }

    fn log(&self, level: LogLevel, component: Component, subject: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let subject_part = subject.map(|s| format!(" [{}]", s)).unwrap_or_default();
        let log_entry = format!(
            "{} {} {}{}: {}",
            timestamp, level, component, subject_part, message
        );

        // Console output
        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", component, subject_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", component, subject_part, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => {} // Skip debug in non-timestamp mode
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn dispatch(level: LogLevel, component: Component, subject: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(level, component, subject, message);
        }
    }
}

/// Log a general informational message
pub fn info(component: Component, subject: Option<&str>, message: &str) {
    dispatch(LogLevel::Info, component, subject, message);
}

/// Log a warning message
pub fn warn(component: Component, subject: Option<&str>, message: &str) {
    dispatch(LogLevel::Warning, component, subject, message);
}

/// Log an error message
pub fn error(component: Component, subject: Option<&str>, message: &str) {
    dispatch(LogLevel::Error, component, subject, message);
}

/// Log a debug message
pub fn debug(component: Component, subject: Option<&str>, message: &str) {
    dispatch(LogLevel::Debug, component, subject, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a failed bridge poll.
///
/// An unreachable bridge is the normal state whenever the sensor board is
/// off, so it is expected. A bridge that answers with an error status or a
/// body we cannot read points at firmware or proxy trouble.
pub fn classify_bridge_failure(err: &BridgeError) -> FailureType {
    match err {
        BridgeError::Unreachable(_) => FailureType::Expected,
        BridgeError::HttpError(code) if *code >= 500 => FailureType::Unknown,
        BridgeError::HttpError(_) => FailureType::Unexpected,
        BridgeError::ParseError(_) => FailureType::Unexpected,
    }
}

/// Classify a reading store failure
pub fn classify_store_failure(err: &StoreError) -> FailureType {
    match err {
        // Someone else deleted the row first
        StoreError::NotFound(_) => FailureType::Expected,
        StoreError::Connection(_) => FailureType::Unexpected,
        StoreError::Write(msg) | StoreError::Delete(msg) | StoreError::Subscribe(msg) => {
            if msg.contains("timeout") || msg.contains("connection") {
                FailureType::Unknown
            } else {
                FailureType::Unexpected
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a failed poll tick with automatic classification
pub fn log_bridge_failure(endpoint: &str, err: &BridgeError) {
    let failure_type = classify_bridge_failure(err);
    let message = format!("poll failed [{}]: {}", failure_type, err);

    match failure_type {
        FailureType::Expected => debug(Component::Bridge, Some(endpoint), &message),
        FailureType::Unexpected => error(Component::Bridge, Some(endpoint), &message),
        FailureType::Unknown => warn(Component::Bridge, Some(endpoint), &message),
    }
}

/// Log a store failure with classification
pub fn log_store_failure(subject: Option<&str>, operation: &str, err: &StoreError) {
    let failure_type = classify_store_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(Component::Store, subject, &message),
        FailureType::Unexpected => error(Component::Store, subject, &message),
        FailureType::Unknown => warn(Component::Store, subject, &message),
    }
}
