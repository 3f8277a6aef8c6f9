//! Core error types for cookietimer-core.
//!
//! This module defines the error hierarchy using thiserror. Validation
//! errors are raised at input time, database errors wrap rusqlite, and
//! `CoreError` is what every public fallible operation returns.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::TimerId;

/// Core error type for cookietimer-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No timer with the given id exists
    #[error("No timer with id {0}")]
    TimerNotFound(TimerId),

    /// The undo window for the last deletion has passed
    #[error("Nothing to undo: the last deletion is older than {window_secs} seconds")]
    UndoExpired { window_secs: u64 },

    /// A blocking storage task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Background(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
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

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
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

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Could not determine or create the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Timer name is empty after trimming
    #[error("Timer name must not be empty")]
    EmptyName,

    /// Input that should be a number is not one
    #[error("'{input}' is not a valid number for {field}")]
    NotANumber { field: &'static str, input: String },

    /// Duration is zero or negative
    #[error("Duration must be a positive number of minutes, got {0}")]
    NonPositiveDuration(i64),

    /// Duration does not fit in the seconds range
    #[error("Duration of {0} minutes is too long")]
    DurationTooLong(i64),

    /// Unknown temperature unit name
    #[error("Unknown temperature unit '{0}' (expected celsius, fahrenheit or gas_mark)")]
    UnknownUnit(String),

    #[error("Unknown theme '{0}' (expected light, dark or oven_glow)")]
    UnknownTheme(String),

    /// A record breaks one of its invariants
    #[error("Timer {id} is inconsistent: {message}")]
    BrokenInvariant { id: TimerId, message: String },
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        CoreError::Background(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_and_locked_map_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(DatabaseError::from(err), DatabaseError::Locked));
    }

    #[test]
    fn validation_messages_name_the_input() {
        let err = ValidationError::NotANumber {
            field: "duration",
            input: "ten".into(),
        };
        assert_eq!(err.to_string(), "'ten' is not a valid number for duration");
    }
}
