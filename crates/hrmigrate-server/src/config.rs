//! Configuration management

use serde::{Deserialize, Serialize};

use hrmigrate_common::env;

use crate::db::DbConfig;
use crate::migration::{
    DispatchConfig, DEFAULT_AUDIT_PREFIX, DEFAULT_BATCH_SIZE, DEFAULT_ERROR_PREFIX, MAX_BATCH_SIZE,
};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Bucket used when neither `MIGRATION_BUCKET` nor `S3_BUCKET` is set.
pub const DEFAULT_BUCKET: &str = "hrmigrate-data";

/// Default number of batches in flight during dispatch.
pub const DEFAULT_CONCURRENCY: usize = 1;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub migration: MigrationConfig,
    pub database: DbConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var_or("HRMIGRATE_HOST", DEFAULT_SERVER_HOST),
            port: env::parse_or("HRMIGRATE_PORT", DEFAULT_SERVER_PORT)?,
            shutdown_timeout_secs: env::parse_or(
                "HRMIGRATE_SHUTDOWN_TIMEOUT",
                DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            )?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Batching and artifact settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    pub bucket: String,
    pub error_prefix: String,
    pub audit_prefix: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            bucket: DEFAULT_BUCKET.to_string(),
            error_prefix: DEFAULT_ERROR_PREFIX.to_string(),
            audit_prefix: DEFAULT_AUDIT_PREFIX.to_string(),
        }
    }
}

impl MigrationConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bucket = env::var_opt("MIGRATION_BUCKET")
            .or_else(|| env::var_opt("S3_BUCKET"))
            .unwrap_or_else(|| DEFAULT_BUCKET.to_string());

        let config = Self {
            batch_size: env::parse_or("MIGRATION_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            concurrency: env::parse_or("MIGRATION_CONCURRENCY", DEFAULT_CONCURRENCY)?,
            bucket,
            error_prefix: env::var_or("MIGRATION_ERROR_PREFIX", DEFAULT_ERROR_PREFIX),
            audit_prefix: env::var_or("MIGRATION_AUDIT_PREFIX", DEFAULT_AUDIT_PREFIX),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            anyhow::bail!(
                "Batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE,
                self.batch_size
            );
        }

        if self.concurrency == 0 {
            anyhow::bail!("Concurrency must be at least 1");
        }

        if self.bucket.is_empty() {
            anyhow::bail!("Bucket name cannot be empty");
        }

        Ok(())
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            batch_size: self.batch_size,
            concurrency: self.concurrency,
            audit_prefix: self.audit_prefix.clone(),
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig::from_env()?,
            migration: MigrationConfig::from_env()?,
            database: DbConfig::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        self.migration.validate()
    }
}
