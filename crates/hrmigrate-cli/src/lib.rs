//! hrmigrate CLI Library
//!
//! Command-line front end for the hrmigrate pipeline:
//!
//! - **Dispatch**: batch a source file from object storage and push every
//!   batch through validate/load (`hrmigrate dispatch`)
//! - **Backup**: export all tables to object storage (`hrmigrate backup`)
//! - **Restore**: replace table contents with the newest export (`hrmigrate restore`)

pub mod commands;
pub mod error;

pub use error::{CliError, Result};

use clap::{Parser, Subcommand};

/// hrmigrate - batch validation and referential load for HR tables
#[derive(Parser, Debug)]
#[command(name = "hrmigrate")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Batch a source file and run every batch through validate/load
    Dispatch(DispatchArgs),

    /// Export departments, jobs and hired_employees to object storage
    Backup {
        /// Bucket to write the backup to (defaults to MIGRATION_BUCKET)
        #[arg(short, long)]
        bucket: Option<String>,
    },

    /// Replace all table contents with the newest backup
    Restore {
        /// Bucket holding the backups (defaults to MIGRATION_BUCKET)
        #[arg(short, long)]
        bucket: Option<String>,
    },
}

#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct DispatchArgs {
    /// Object key of the source file, e.g. data/hired_employees.csv
    #[arg(short, long)]
    pub key: String,

    /// Target table (defaults to the file stem of the key)
    #[arg(short, long)]
    pub table: Option<String>,

    /// Bucket holding the source file (defaults to MIGRATION_BUCKET)
    #[arg(short, long)]
    pub bucket: Option<String>,

    /// Records per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Batches in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Base URL of an hrmigrate-server; batches run in-process when omitted
    #[arg(long, env = "HRMIGRATE_ENDPOINT")]
    pub endpoint: Option<String>,
}
