//! hrmigrate server library
//!
//! Batch validation and idempotent load of the `departments`, `jobs` and
//! `hired_employees` tables.
//!
//! # Overview
//!
//! - **Migration**: partitioning, validation, error reports, bulk load and
//!   dispatch of source files (see [`migration`])
//! - **Backup**: full-table export to object storage and restore
//! - **Database**: connection parameter resolution and pooling with SQLx
//! - **Storage**: S3-compatible object store plus an in-memory stand-in
//! - **API**: axum routes serving the remote end of the invocation channel
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hrmigrate_server::db::{create_pool, DbConfig, EnvConnectParams};
//! use hrmigrate_server::migration::{
//!     DispatchConfig, Dispatcher, ErrorReporter, LocalInvoker, PgLoader, Pipeline,
//! };
//! use hrmigrate_server::storage::{config::StorageConfig, Storage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = create_pool(&EnvConnectParams, &DbConfig::from_env()?).await?;
//!     let store = Arc::new(Storage::new(StorageConfig::from_env()?).await?);
//!
//!     let pipeline = Pipeline::new(
//!         Arc::new(PgLoader::new(pool.clone())),
//!         ErrorReporter::new(store.clone()),
//!     );
//!     let dispatcher = Dispatcher::new(
//!         Arc::new(LocalInvoker::new(pipeline)),
//!         store,
//!         DispatchConfig::default(),
//!     );
//!
//!     let report = dispatcher.dispatch_object("my-bucket", "data/jobs.csv", None).await?;
//!     println!("{} batches, {} failed", report.entries.len(), report.failed());
//!
//!     pool.close().await;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod storage;

// Re-export commonly used types
pub use error::{AppError, ServerResult};
