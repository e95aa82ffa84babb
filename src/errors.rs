//! Unified application error type.
//! All modules (core, store, authority, db, cli) return AppError to keep the
//! error handling consistent and easy to manage.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // ---------------------------
    // IO
    // ---------------------------
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ---------------------------
    // Database-related
    // ---------------------------
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Database migration error: {0}")]
    Migration(String),

    /// A write vetoed by the storage-level rules on the server of record.
    #[error("Storage rule violation: {0}")]
    InvariantViolation(String),

    // ---------------------------
    // Serialization
    // ---------------------------
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ---------------------------
    // Compliance errors
    // ---------------------------
    #[error(
        "Break must be at least 10 minutes. Current: {} minutes. {minutes_remaining} minute(s) remaining.",
        .current_duration_seconds / 60
    )]
    ValidationRejected {
        minutes_remaining: u64,
        current_duration_seconds: u64,
    },

    /// Retryable failure of the validator or of a provider. The payload is
    /// diagnostic only and never shown to the learner.
    #[error("The request could not be completed. Please try again.")]
    SystemError(String),

    #[error("Local session storage error: {0}")]
    Persistence(String),

    #[error("Duplicate submission: {0}")]
    DuplicateSubmission(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Daily instruction limit reached; study is locked until the next compliance day")]
    LockedOut,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ---------------------------
    // Config errors
    // ---------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration")]
    ConfigLoad,

    #[error("Failed to save configuration")]
    ConfigSave,

    // ---------------------------
    // Export errors
    // ---------------------------
    #[error("Export error: {0}")]
    Export(String),

    // ---------------------------
    // Generic fallback
    // ---------------------------
    #[error("Internal error: {0}")]
    Other(String),
}

impl AppError {
    /// True when the caller may simply try the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::SystemError(_) | AppError::Persistence(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;
