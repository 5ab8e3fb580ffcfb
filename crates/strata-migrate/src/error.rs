//! Error types for the command-line surface.

use std::path::PathBuf;

use strata_core::StrataError;

/// Errors that can occur while loading inputs or reading history.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Diffing, planning or verification failed.
    #[error(transparent)]
    Core(#[from] StrataError),

    /// Database error while reading the history store.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading input files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an input file.
    #[error("Failed to parse '{path}': {message}")]
    ParseError {
        /// Path to the input file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A history row could not be turned into a migration record.
    #[error("Invalid history row {row}: {message}")]
    InvalidRecord {
        /// Row id in the history table.
        row: i64,
        /// What was wrong with it.
        message: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for command-line operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
