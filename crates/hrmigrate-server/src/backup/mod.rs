//! Full-table backup and restore
//!
//! An export writes every row of `departments`, `jobs` and `hired_employees`
//! as JSON lines into one timestamped folder:
//!
//! ```text
//! backups_tables/tables_backup_2024-03-01_12-30-05/departments.jsonl
//! backups_tables/tables_backup_2024-03-01_12-30-05/jobs.jsonl
//! backups_tables/tables_backup_2024-03-01_12-30-05/hired_employees.jsonl
//! ```
//!
//! A restore replaces the contents of all three tables with the newest
//! folder in a single transaction.

pub mod models;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use thiserror::Error;
use tracing::{info, instrument};

pub use models::{
    BackupSummary, DepartmentRow, HiredEmployeeRow, JobRow, BACKUP_PREFIX, RESTORE_CHUNK_SIZE,
};

use crate::migration::{TableName, ARTIFACT_TIMESTAMP_FORMAT};
use crate::storage::ObjectStore;

const JSONL_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("No backup found under s3://{bucket}/{BACKUP_PREFIX}/")]
    NoBackup { bucket: String },

    #[error("Object store error on '{key}': {source}")]
    Storage {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Malformed backup line {line} in '{key}': {source}")]
    Malformed {
        key: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type BackupResult<T> = Result<T, BackupError>;

fn table_key(folder: &str, table: TableName) -> String {
    format!("{}/{}.jsonl", folder, table)
}

fn to_jsonl<T: Serialize>(rows: &[T]) -> BackupResult<Vec<u8>> {
    let mut out = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.push(b'\n');
    }
    Ok(out)
}

fn from_jsonl<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> BackupResult<Vec<T>> {
    String::from_utf8_lossy(bytes)
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| BackupError::Malformed {
                key: key.to_string(),
                line: index + 1,
                source,
            })
        })
        .collect()
}

async fn put_table<T: Serialize>(
    store: &dyn ObjectStore,
    bucket: &str,
    folder: &str,
    table: TableName,
    rows: &[T],
) -> BackupResult<()> {
    let key = table_key(folder, table);
    let bytes = to_jsonl(rows)?;
    store
        .put(bucket, &key, bytes, Some(JSONL_CONTENT_TYPE))
        .await
        .map_err(|source| BackupError::Storage { key, source })?;
    Ok(())
}

async fn get_table<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    bucket: &str,
    folder: &str,
    table: TableName,
) -> BackupResult<Vec<T>> {
    let key = table_key(folder, table);
    let bytes = store
        .get(bucket, &key)
        .await
        .map_err(|source| BackupError::Storage {
            key: key.clone(),
            source,
        })?;
    from_jsonl(&key, &bytes)
}

/// Export all three tables to a new backup folder and return its summary.
pub async fn export_tables(
    pool: &PgPool,
    store: &dyn ObjectStore,
    bucket: &str,
) -> BackupResult<BackupSummary> {
    export_tables_at(pool, store, bucket, Utc::now()).await
}

#[instrument(skip(pool, store))]
pub async fn export_tables_at(
    pool: &PgPool,
    store: &dyn ObjectStore,
    bucket: &str,
    at: DateTime<Utc>,
) -> BackupResult<BackupSummary> {
    let folder = format!(
        "{}/tables_backup_{}",
        BACKUP_PREFIX,
        at.format(ARTIFACT_TIMESTAMP_FORMAT)
    );

    let departments = sqlx::query_as::<_, DepartmentRow>(
        "SELECT id, department FROM departments ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    let jobs = sqlx::query_as::<_, JobRow>("SELECT id, job FROM jobs ORDER BY id")
        .fetch_all(pool)
        .await?;
    let employees = sqlx::query_as::<_, HiredEmployeeRow>(
        r#"
        SELECT id, name, datetime, department_id, job_id
        FROM hired_employees
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    put_table(store, bucket, &folder, TableName::Departments, &departments).await?;
    put_table(store, bucket, &folder, TableName::Jobs, &jobs).await?;
    put_table(store, bucket, &folder, TableName::HiredEmployees, &employees).await?;

    let summary = BackupSummary {
        folder,
        departments: departments.len(),
        jobs: jobs.len(),
        hired_employees: employees.len(),
    };

    info!(folder = %summary.folder, rows = summary.total(), "Tables exported");

    Ok(summary)
}

/// Newest backup folder in `bucket`, by lexical order of its timestamped name.
pub async fn latest_backup(store: &dyn ObjectStore, bucket: &str) -> BackupResult<Option<String>> {
    let prefix = format!("{}/", BACKUP_PREFIX);
    let keys = store
        .list(bucket, &prefix)
        .await
        .map_err(|source| BackupError::Storage {
            key: prefix.clone(),
            source,
        })?;

    Ok(keys
        .iter()
        .filter_map(|key| {
            let rest = key.strip_prefix(&prefix)?;
            let (folder, _) = rest.split_once('/')?;
            folder.starts_with("tables_backup_").then_some(folder)
        })
        .max()
        .map(|folder| format!("{}{}", prefix, folder)))
}

async fn insert_departments(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[DepartmentRow],
) -> BackupResult<()> {
    for chunk in rows.chunks(RESTORE_CHUNK_SIZE) {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO departments (id, department) ");
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(row.id).push_bind(&row.department);
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn insert_jobs(tx: &mut Transaction<'_, Postgres>, rows: &[JobRow]) -> BackupResult<()> {
    for chunk in rows.chunks(RESTORE_CHUNK_SIZE) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO jobs (id, job) ");
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(row.id).push_bind(&row.job);
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn insert_employees(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[HiredEmployeeRow],
) -> BackupResult<()> {
    for chunk in rows.chunks(RESTORE_CHUNK_SIZE) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO hired_employees (id, name, datetime, department_id, job_id) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(row.id)
                .push_bind(&row.name)
                .push_bind(row.datetime)
                .push_bind(row.department_id)
                .push_bind(row.job_id);
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

/// Replace the contents of all three tables with the newest backup.
#[instrument(skip(pool, store))]
pub async fn restore_latest(
    pool: &PgPool,
    store: &dyn ObjectStore,
    bucket: &str,
) -> BackupResult<BackupSummary> {
    let folder = latest_backup(store, bucket).await?.ok_or_else(|| BackupError::NoBackup {
        bucket: bucket.to_string(),
    })?;

    // Read everything before touching the database
    let departments: Vec<DepartmentRow> =
        get_table(store, bucket, &folder, TableName::Departments).await?;
    let jobs: Vec<JobRow> = get_table(store, bucket, &folder, TableName::Jobs).await?;
    let employees: Vec<HiredEmployeeRow> =
        get_table(store, bucket, &folder, TableName::HiredEmployees).await?;

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM hired_employees").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM departments").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM jobs").execute(&mut *tx).await?;

    insert_departments(&mut tx, &departments).await?;
    insert_jobs(&mut tx, &jobs).await?;
    insert_employees(&mut tx, &employees).await?;

    tx.commit().await?;

    let summary = BackupSummary {
        folder,
        departments: departments.len(),
        jobs: jobs.len(),
        hired_employees: employees.len(),
    };

    info!(folder = %summary.folder, rows = summary.total(), "Tables restored");

    Ok(summary)
}
