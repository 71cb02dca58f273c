//! Core error types for ghost-core.
//!
//! This module defines the error hierarchy using thiserror. Analytic
//! components never surface these to callers directly -- they degrade to
//! best-effort defaults -- so the variants here cover configuration,
//! validation, and persistence boundaries only.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for ghost-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persistence-related errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Provider (health / calendar / receipt sink) errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Persistence-specific errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to open the backing database
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Schema migration failed: {0}")]
    MigrationFailed(String),

    /// A write could not be committed; the caller should retry the event
    #[error("Write failed, retry advised: {0}")]
    WriteFailed(String),

    /// Stored metric versions do not match the registry
    #[error("Metric version mismatch for '{metric}': stored {stored}, expected {expected}")]
    MetricVersionMismatch {
        metric: String,
        stored: String,
        expected: String,
    },
}

/// Configuration-specific errors. Fatal at engine construction.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// A weight table does not satisfy its structural constraints
    #[error("Invalid weight table '{table}': {message}")]
    InvalidWeights { table: String, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors raised by stores and data-model guards.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end ({end}) must be greater than start ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// A block status transition that the lifecycle forbids
    #[error("Block {block_id}: illegal status transition {from} -> {to}")]
    IllegalStatusTransition {
        block_id: String,
        from: String,
        to: String,
    },

    /// Time-slot key out of range
    #[error("Invalid time slot: day_of_week {day_of_week} (1-7), hour_of_day {hour_of_day} (0-23)")]
    InvalidTimeSlot { day_of_week: u8, hour_of_day: u8 },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors returned by collaborator-provided interfaces.
///
/// The orchestrator retries `Transient` failures within a cycle; `Permanent`
/// failures abort the attempt without retry.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider failed in a way that may succeed on retry
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// The provider failed in a way that will not succeed on retry
    #[error("Permanent provider failure: {0}")]
    Permanent(String),
}

impl ProviderError {
    /// Whether the orchestrator should retry the failed call within a cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        PersistenceError::QueryFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
