//! Error types shared across hrmigrate crates

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, HrError>;

/// Errors raised outside the migration pipeline proper
#[derive(Error, Debug)]
pub enum HrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv { name: String, value: String },
}

impl HrError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
