//! Idempotent bulk load
//!
//! One validated batch becomes one parameterized statement:
//!
//! ```sql
//! INSERT INTO hired_employees (id, name, datetime, department_id, job_id)
//! SELECT q.id, q.name, q.datetime, q.department_id, q.job_id
//! FROM (VALUES ($1, $2, $3, $4, $5), ...) AS q (id, name, datetime, department_id, job_id)
//! WHERE EXISTS (SELECT 1 FROM departments d WHERE d.id = q.department_id)
//!   AND EXISTS (SELECT 1 FROM jobs j WHERE j.id = q.job_id)
//! ON CONFLICT (id) DO NOTHING
//! ```
//!
//! Lookup tables skip the `EXISTS` guard. Rows already present are left
//! untouched, so replaying a batch inserts nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use tracing::{debug, instrument};

use super::source::Record;
use super::table::{TableKind, TableName};
use super::validate::{parse_int, parse_timestamp};

#[derive(Debug, Error)]
pub enum LoadError {
    /// A record that passed validation still failed to convert
    #[error("Row {row}: cannot cast {field} value {value:?}")]
    Cast {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("Row {row}: expected {expected} fields but found {found}")]
    Shape {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Writes validated batches to the relational store.
#[async_trait]
pub trait BatchLoader: Send + Sync {
    /// Insert `records` into `table` and return how many rows were newly written.
    async fn load(&self, table: TableName, records: &[Record]) -> Result<u64, LoadError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LookupRow {
    id: i32,
    label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EmployeeRow {
    id: i32,
    name: String,
    datetime: DateTime<Utc>,
    department_id: i32,
    job_id: i32,
}

fn check_shape(row: usize, record: &Record, kind: TableKind) -> Result<(), LoadError> {
    if record.arity() == kind.arity() {
        Ok(())
    } else {
        Err(LoadError::Shape {
            row,
            expected: kind.arity(),
            found: record.arity(),
        })
    }
}

fn field<'a>(record: &'a Record, index: usize) -> &'a str {
    record.get(index).unwrap_or_default()
}

fn cast_int(row: usize, field_name: &'static str, raw: &str) -> Result<i32, LoadError> {
    parse_int(raw).ok_or_else(|| LoadError::Cast {
        row,
        field: field_name,
        value: raw.to_string(),
    })
}

fn lookup_rows(records: &[Record]) -> Result<Vec<LookupRow>, LoadError> {
    records
        .iter()
        .enumerate()
        .map(|(row, record)| {
            check_shape(row, record, TableKind::Lookup)?;
            Ok(LookupRow {
                id: cast_int(row, "id", field(record, 0))?,
                label: field(record, 1).to_string(),
            })
        })
        .collect()
}

fn employee_rows(records: &[Record]) -> Result<Vec<EmployeeRow>, LoadError> {
    records
        .iter()
        .enumerate()
        .map(|(row, record)| {
            check_shape(row, record, TableKind::Child)?;
            let raw_datetime = field(record, 2);
            Ok(EmployeeRow {
                id: cast_int(row, "id", field(record, 0))?,
                name: field(record, 1).to_string(),
                datetime: parse_timestamp(raw_datetime).ok_or_else(|| LoadError::Cast {
                    row,
                    field: "datetime",
                    value: raw_datetime.to_string(),
                })?,
                department_id: cast_int(row, "department_id", field(record, 3))?,
                job_id: cast_int(row, "job_id", field(record, 4))?,
            })
        })
        .collect()
}

/// PostgreSQL loader over a shared pool
#[derive(Clone)]
pub struct PgLoader {
    pool: PgPool,
}

impl PgLoader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn execute(&self, mut builder: QueryBuilder<'_, Postgres>) -> Result<u64, LoadError> {
        let mut tx = self.pool.begin().await?;
        let result = builder.build().execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn load_lookup(&self, table: TableName, records: &[Record]) -> Result<u64, LoadError> {
        let rows = lookup_rows(records)?;
        // label_column is only None for the child table
        let label = table.label_column().unwrap_or("label");

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} (id, {}) ", table.as_str(), label));
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.id).push_bind(row.label);
        });
        builder.push(" ON CONFLICT (id) DO NOTHING");

        self.execute(builder).await
    }

    async fn load_employees(&self, records: &[Record]) -> Result<u64, LoadError> {
        let rows = employee_rows(records)?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO hired_employees (id, name, datetime, department_id, job_id) \
             SELECT q.id, q.name, q.datetime, q.department_id, q.job_id FROM (",
        );
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.id)
                .push_bind(row.name)
                .push_bind(row.datetime)
                .push_bind(row.department_id)
                .push_bind(row.job_id);
        });
        builder.push(
            ") AS q (id, name, datetime, department_id, job_id) \
             WHERE EXISTS (SELECT 1 FROM departments d WHERE d.id = q.department_id) \
             AND EXISTS (SELECT 1 FROM jobs j WHERE j.id = q.job_id) \
             ON CONFLICT (id) DO NOTHING",
        );

        self.execute(builder).await
    }
}

#[async_trait]
impl BatchLoader for PgLoader {
    #[instrument(skip(self, records), fields(table = %table, rows = records.len()))]
    async fn load(&self, table: TableName, records: &[Record]) -> Result<u64, LoadError> {
        if records.is_empty() {
            return Ok(0);
        }

        let affected = match table.kind() {
            TableKind::Lookup => self.load_lookup(table, records).await?,
            TableKind::Child => self.load_employees(records).await?,
        };

        // Rows skipped either already existed or referenced a missing parent
        debug!(
            affected,
            skipped = (records.len() as u64).saturating_sub(affected),
            "Batch loaded"
        );

        Ok(affected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_employee_rows_cast_fields() {
        let rows = employee_rows(&[Record::new([
            " 7 ",
            "Ana",
            "2021-07-27T16:02:08Z",
            "2",
            "13",
        ])])
        .unwrap();

        assert_eq!(rows[0].id, 7);
        assert_eq!(rows[0].datetime.to_rfc3339(), "2021-07-27T16:02:08+00:00");
        assert_eq!(rows[0].job_id, 13);
    }

    #[test]
    fn test_cast_failure_names_row_and_field() {
        let err = employee_rows(&[
            Record::new(["1", "Ana", "2021-07-27T16:02:08Z", "2", "13"]),
            Record::new(["2", "Ben", "2021-07-27T16:02:08Z", "two", "13"]),
        ])
        .unwrap_err();

        match err {
            LoadError::Cast { row, field, value } => {
                assert_eq!(row, 1);
                assert_eq!(field, "department_id");
                assert_eq!(value, "two");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        assert!(matches!(
            lookup_rows(&[Record::new(["1", "Engineer", "extra"])]),
            Err(LoadError::Shape { expected: 2, found: 3, .. })
        ));
    }

    #[test]
    fn test_lookup_label_kept_verbatim() {
        let rows = lookup_rows(&[Record::new(["4", ""]), Record::new(["5", " Sales "])]).unwrap();
        assert_eq!(rows[0].label, "");
        assert_eq!(rows[1].label, " Sales ");
    }
}
