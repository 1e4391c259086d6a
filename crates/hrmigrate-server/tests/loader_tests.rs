//! Loader behavior against a real database

use sqlx::PgPool;

use hrmigrate_server::migration::{BatchLoader, LoadError, PgLoader, Record, TableName};

mod helpers;
use helpers::{count, department, employee, ids, job, seed_lookups};

#[sqlx::test(migrations = "../../migrations")]
async fn test_lookup_load_inserts_rows(pool: PgPool) {
    let loader = PgLoader::new(pool.clone());

    let affected = loader
        .load(
            TableName::Departments,
            &[department(1, "Product Management"), department(2, "Sales")],
        )
        .await
        .unwrap();

    assert_eq!(affected, 2);
    assert_eq!(ids(&pool, TableName::Departments).await, vec![1, 2]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_reloading_a_batch_is_idempotent(pool: PgPool) {
    seed_lookups(&pool, 2).await;
    let loader = PgLoader::new(pool.clone());
    let rows = vec![employee(1, "Harold Vogt", 1, 2), employee(2, "Ty Hofer", 2, 1)];

    let first = loader.load(TableName::HiredEmployees, &rows).await.unwrap();
    let second = loader.load(TableName::HiredEmployees, &rows).await.unwrap();

    assert_eq!(first, 2);
    assert_eq!(second, 0);
    assert_eq!(count(&pool, TableName::HiredEmployees).await, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_existing_rows_are_not_overwritten(pool: PgPool) {
    let loader = PgLoader::new(pool.clone());
    loader.load(TableName::Jobs, &[job(1, "Engineer")]).await.unwrap();

    let affected = loader.load(TableName::Jobs, &[job(1, "Renamed")]).await.unwrap();

    let label: String = sqlx::query_scalar("SELECT job FROM jobs WHERE id = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(affected, 0);
    assert_eq!(label, "Engineer");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_rows_with_missing_parent_are_skipped(pool: PgPool) {
    seed_lookups(&pool, 1).await;
    let loader = PgLoader::new(pool.clone());

    let affected = loader
        .load(
            TableName::HiredEmployees,
            &[
                employee(10, "Valid", 1, 1),
                employee(11, "Unknown department", 99, 1),
                employee(12, "Unknown job", 1, 42),
            ],
        )
        .await
        .unwrap();

    assert_eq!(affected, 1);
    assert_eq!(ids(&pool, TableName::HiredEmployees).await, vec![10]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_skipped_rows_load_once_parents_arrive(pool: PgPool) {
    let loader = PgLoader::new(pool.clone());
    let rows = vec![employee(1, "Early", 1, 1)];

    assert_eq!(loader.load(TableName::HiredEmployees, &rows).await.unwrap(), 0);

    seed_lookups(&pool, 1).await;
    assert_eq!(loader.load(TableName::HiredEmployees, &rows).await.unwrap(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_duplicate_ids_within_batch_insert_once(pool: PgPool) {
    let loader = PgLoader::new(pool.clone());

    let affected = loader
        .load(TableName::Jobs, &[job(5, "First"), job(5, "Second")])
        .await
        .unwrap();

    assert_eq!(affected, 1);
    assert_eq!(count(&pool, TableName::Jobs).await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_timestamp_stored_as_utc(pool: PgPool) {
    seed_lookups(&pool, 1).await;
    let loader = PgLoader::new(pool.clone());
    loader
        .load(TableName::HiredEmployees, &[employee(1, "Ana", 1, 1)])
        .await
        .unwrap();

    let stored: chrono::DateTime<chrono::Utc> =
        sqlx::query_scalar("SELECT datetime FROM hired_employees WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored.to_rfc3339(), "2021-07-27T16:02:08+00:00");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_empty_batch_is_noop(pool: PgPool) {
    let loader = PgLoader::new(pool.clone());
    assert_eq!(loader.load(TableName::Jobs, &[]).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_unvalidated_record_is_cast_error(pool: PgPool) {
    let loader = PgLoader::new(pool.clone());

    let result = loader
        .load(TableName::Jobs, &[job(1, "Engineer"), Record::new(["two", "Analyst"])])
        .await;

    assert!(matches!(result, Err(LoadError::Cast { row: 1, field: "id", .. })));
    assert_eq!(count(&pool, TableName::Jobs).await, 0);
}
