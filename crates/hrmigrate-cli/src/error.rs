//! Error types for the hrmigrate CLI
//!
//! Messages are user-facing and say what to check next.

use thiserror::Error;

use hrmigrate_server::backup::BackupError;
use hrmigrate_server::db::DbError;
use hrmigrate_server::migration::{DispatchError, InvokeError};

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Settings from flags or environment are unusable
    #[error("Configuration error: {0}. Check the MIGRATION_*, S3_* and PG_* variables or your .env file.")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Invalid invocation endpoint: {0}")]
    Invoke(#[from] InvokeError),

    #[error("Backup failed: {0}")]
    Backup(#[from] BackupError),

    #[error("Storage error: {0}. Check that the bucket exists and credentials are valid.")]
    Storage(String),
}

impl CliError {
    pub fn config(message: impl std::fmt::Display) -> Self {
        Self::Config(message.to_string())
    }

    pub fn storage(message: impl std::fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }
}
