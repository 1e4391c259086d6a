//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod backup;
pub mod dispatch;

use std::sync::Arc;

use hrmigrate_server::storage::{config::StorageConfig, Storage};

use crate::error::{CliError, Result};

/// S3 client from `S3_*` settings
pub(crate) async fn open_storage() -> Result<Arc<Storage>> {
    let config = StorageConfig::from_env().map_err(CliError::storage)?;
    let storage = Storage::new(config).await.map_err(CliError::storage)?;
    Ok(Arc::new(storage))
}
