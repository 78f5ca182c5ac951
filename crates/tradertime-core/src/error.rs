//! Core error types for tradertime-core.
//!
//! Errors are grouped by the collaborator that produced them and aggregated
//! into [`EngineError`]. The façade never lets one of these escape as a
//! panic; see [`crate::engine::OperationResult`].

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Core error type for tradertime-core.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A required argument was missing or empty.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The trigger instant is not strictly in the future.
    #[error("Trigger time {trigger} is not after current time {now}")]
    InvalidTrigger {
        trigger: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// A host primitive (wake, alert, tone, vibration) failed.
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// Durable alarm store failure.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration failure.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failures reported by host capabilities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The wake-arming primitive rejected the request.
    #[error("Failed to arm wake '{key}': {message}")]
    ArmFailed { key: String, message: String },

    /// The wake-disarming primitive failed.
    #[error("Failed to disarm wake '{key}': {message}")]
    DisarmFailed { key: String, message: String },

    /// Alert presentation failed.
    #[error("Alert '{alert_id}' failed: {message}")]
    Alert { alert_id: String, message: String },

    /// Audio playback failed.
    #[error("Tone playback failed: {0}")]
    Tone(String),

    /// Vibration failed.
    #[error("Vibration failed: {0}")]
    Vibration(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) if e.code == rusqlite::ErrorCode::DatabaseLocked => {
                DatabaseError::Locked
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Database(err.into())
    }
}

impl EngineError {
    /// Stable machine-readable class name, surfaced to bridge callers.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidArgument(_) => "InvalidArgument",
            EngineError::InvalidTrigger { .. } => "InvalidTrigger",
            EngineError::Host(_) => "Host",
            EngineError::Database(_) => "Database",
            EngineError::Config(_) => "Config",
        }
    }
}

/// Result type alias for EngineError
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
