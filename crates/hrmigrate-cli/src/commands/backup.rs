//! `hrmigrate backup` and `hrmigrate restore` command implementations

use colored::Colorize;

use hrmigrate_server::backup::{self, BackupSummary};
use hrmigrate_server::config::MigrationConfig;
use hrmigrate_server::db::{create_pool, DbConfig, EnvConnectParams};

use super::open_storage;
use crate::error::{CliError, Result};

fn resolve_bucket(bucket: Option<String>) -> Result<String> {
    match bucket {
        Some(bucket) => Ok(bucket),
        None => Ok(MigrationConfig::from_env().map_err(CliError::config)?.bucket),
    }
}

fn print_summary(action: &str, summary: &BackupSummary) {
    println!("{} {}", action.green().bold(), summary.folder);
    println!("  departments:     {}", summary.departments);
    println!("  jobs:            {}", summary.jobs);
    println!("  hired_employees: {}", summary.hired_employees);
}

/// Export every table to a new backup folder
pub async fn run_backup(bucket: Option<String>) -> Result<()> {
    let bucket = resolve_bucket(bucket)?;
    let store = open_storage().await?;
    let pool = create_pool(&EnvConnectParams, &DbConfig::from_env()?).await?;

    let result = backup::export_tables(&pool, store.as_ref(), &bucket).await;
    pool.close().await;

    print_summary("Exported to", &result?);
    Ok(())
}

/// Replace table contents with the newest backup folder
pub async fn run_restore(bucket: Option<String>) -> Result<()> {
    let bucket = resolve_bucket(bucket)?;
    let store = open_storage().await?;
    let pool = create_pool(&EnvConnectParams, &DbConfig::from_env()?).await?;

    let result = backup::restore_latest(&pool, store.as_ref(), &bucket).await;
    pool.close().await;

    print_summary("Restored from", &result?);
    Ok(())
}
