//! Test helpers for hrmigrate server integration tests
//!
//! Record builders for the three tables plus small database assertions.
//! Database tests get their pool from `#[sqlx::test]`, which applies the
//! workspace migrations to a fresh database per test.

#![allow(dead_code)]

use sqlx::PgPool;
use std::sync::Arc;

use hrmigrate_server::migration::{
    Batch, ErrorReporter, PgLoader, Pipeline, Record, TableName,
};
use hrmigrate_server::storage::MemoryStore;

pub const BUCKET: &str = "test-migration-bucket";

pub fn department(id: i32, name: &str) -> Record {
    Record::new([id.to_string(), name.to_string()])
}

pub fn job(id: i32, name: &str) -> Record {
    Record::new([id.to_string(), name.to_string()])
}

pub fn employee(id: i32, name: &str, department_id: i32, job_id: i32) -> Record {
    Record::new([
        id.to_string(),
        name.to_string(),
        "2021-07-27T16:02:08Z".to_string(),
        department_id.to_string(),
        job_id.to_string(),
    ])
}

pub fn batch(batch_id: u32, records: Vec<Record>) -> Batch {
    Batch::new(batch_id, records)
}

/// Pipeline over a real pool with reports going to an in-memory store
pub fn pipeline(pool: &PgPool, store: &MemoryStore) -> Pipeline {
    Pipeline::new(
        Arc::new(PgLoader::new(pool.clone())),
        ErrorReporter::new(Arc::new(store.clone())),
    )
}

pub async fn count(pool: &PgPool, table: TableName) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("Failed to count rows")
}

pub async fn ids(pool: &PgPool, table: TableName) -> Vec<i32> {
    sqlx::query_scalar::<_, i32>(&format!("SELECT id FROM {} ORDER BY id", table))
        .fetch_all(pool)
        .await
        .expect("Failed to list ids")
}

/// Insert departments 1..=n and jobs 1..=n directly
pub async fn seed_lookups(pool: &PgPool, n: i32) {
    for id in 1..=n {
        sqlx::query("INSERT INTO departments (id, department) VALUES ($1, $2)")
            .bind(id)
            .bind(format!("Department {id}"))
            .execute(pool)
            .await
            .expect("Failed to seed department");
        sqlx::query("INSERT INTO jobs (id, job) VALUES ($1, $2)")
            .bind(id)
            .bind(format!("Job {id}"))
            .execute(pool)
            .await
            .expect("Failed to seed job");
    }
}

/// Source bytes as they would arrive from object storage
pub fn csv_source(records: &[Record]) -> Vec<u8> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for record in records {
        writer
            .write_record(record.fields())
            .expect("Failed to write source record");
    }
    writer.into_inner().expect("Failed to flush source bytes")
}
