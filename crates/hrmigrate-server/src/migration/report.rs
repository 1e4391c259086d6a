//! Validation error reports
//!
//! A failed batch is written as one CSV object under the error prefix so an
//! operator can see every row of the batch alongside its defects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

use super::table::TableName;
use super::validate::ValidationFailure;
use super::{ARTIFACT_TIMESTAMP_FORMAT, DEFAULT_ERROR_PREFIX};
use crate::storage::ObjectStore;

const CSV_CONTENT_TYPE: &str = "text/csv";

/// Suffixes tried before an artifact write gives up
const MAX_KEY_ATTEMPTS: u32 = 1000;

/// Writing an artifact to the object store failed
#[derive(Debug, Error)]
#[error("Failed to write artifact s3://{bucket}/{key}")]
pub struct ArtifactWriteError {
    pub bucket: String,
    pub key: String,
    #[source]
    pub source: anyhow::Error,
}

/// Where an artifact ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub bucket: String,
    pub key: String,
    pub size: i64,
}

/// Render rows as CSV bytes. Fields containing the delimiter or quotes are
/// quoted.
pub(crate) fn to_csv_bytes(rows: &[Vec<String>]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    for row in rows {
        writer.write_record(row)?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

/// Candidate keys for `stem`: `{stem}.{ext}`, then `{stem}_1.{ext}`, `{stem}_2.{ext}`, ...
fn candidate_key(stem: &str, extension: &str, suffix: u32) -> String {
    match suffix {
        0 => format!("{stem}.{extension}"),
        n => format!("{stem}_{n}.{extension}"),
    }
}

/// Put `rows` as a CSV object under the first free key derived from `stem`.
///
/// Each candidate is created with a conditional put, so concurrent writers
/// racing for the same stem end up on distinct keys and never overwrite.
pub(crate) async fn write_csv(
    store: &dyn ObjectStore,
    bucket: &str,
    stem: &str,
    rows: &[Vec<String>],
) -> Result<ArtifactRef, ArtifactWriteError> {
    let fail = |key: &str, source: anyhow::Error| ArtifactWriteError {
        bucket: bucket.to_string(),
        key: key.to_string(),
        source,
    };

    let bytes = to_csv_bytes(rows).map_err(|e| fail(&candidate_key(stem, "csv", 0), e))?;

    for suffix in 0..MAX_KEY_ATTEMPTS {
        let key = candidate_key(stem, "csv", suffix);
        let created = store
            .put_new(bucket, &key, bytes.clone(), Some(CSV_CONTENT_TYPE))
            .await
            .map_err(|e| fail(&key, e))?;

        if let Some(upload) = created {
            return Ok(ArtifactRef {
                bucket: bucket.to_string(),
                key: upload.key,
                size: upload.size,
            });
        }
    }

    Err(fail(
        &candidate_key(stem, "csv", 0),
        anyhow::anyhow!("no free key after {} attempts", MAX_KEY_ATTEMPTS),
    ))
}

#[derive(Clone)]
pub struct ErrorReporter {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ErrorReporter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_prefix(store, DEFAULT_ERROR_PREFIX)
    }

    pub fn with_prefix(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Write the report for `failure` to `{prefix}/errors_table_{table}_batch-{id}_{stamp}.csv`.
    pub async fn report(
        &self,
        bucket: &str,
        table: TableName,
        failure: &ValidationFailure,
    ) -> Result<ArtifactRef, ArtifactWriteError> {
        self.report_at(bucket, table, failure, Utc::now()).await
    }

    #[instrument(skip(self, failure), fields(batch_id = failure.batch_id))]
    pub async fn report_at(
        &self,
        bucket: &str,
        table: TableName,
        failure: &ValidationFailure,
        at: DateTime<Utc>,
    ) -> Result<ArtifactRef, ArtifactWriteError> {
        let stem = format!(
            "{}/errors_table_{}_batch-{}_{}",
            self.prefix,
            table,
            failure.batch_id,
            at.format(ARTIFACT_TIMESTAMP_FORMAT)
        );

        let artifact = write_csv(self.store.as_ref(), bucket, &stem, &failure.to_table()).await?;

        info!(
            key = %artifact.key,
            defective_rows = failure.defective_rows(),
            "Wrote validation error report"
        );

        Ok(artifact)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::migration::source::{Batch, Record};
    use crate::migration::table::TableKind;
    use crate::migration::validate::{validate, ValidationOutcome};
    use crate::storage::{MemoryStore, UploadResult};
    use chrono::TimeZone;

    fn sample_failure() -> ValidationFailure {
        let batch = Batch::new(
            2,
            vec![
                Record::new(["1", "Smith, Jane", "2021-01-01T00:00:00Z", "1", "1"]),
                Record::new(["x", "Bob", "2021-01-01T00:00:00Z", "1", "1"]),
            ],
        );
        match validate(TableKind::Child, &batch) {
            ValidationOutcome::Failure(f) => f,
            ValidationOutcome::Pass => panic!("expected a failure"),
        }
    }

    #[tokio::test]
    async fn test_report_key_and_contents() {
        let store = MemoryStore::new();
        let reporter = ErrorReporter::new(Arc::new(store.clone()));
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();

        let artifact = reporter
            .report_at("bucket", TableName::HiredEmployees, &sample_failure(), at)
            .await
            .unwrap();

        assert_eq!(
            artifact.key,
            "logs/errors_table_hired_employees_batch-2_2024-03-01_12-30-05.csv"
        );

        let bytes = store.get("bucket", &artifact.key).await.unwrap();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(bytes.as_slice());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][0], "Batch_Id");
        assert_eq!(&rows[1][0], "2");
        assert!(rows[1][1].contains("Smith, Jane"));
        assert_eq!(&rows[1][2], "");
        assert!(rows[2][2].contains("id (field 1)"));
    }

    #[tokio::test]
    async fn test_same_second_reports_do_not_overwrite() {
        let store = MemoryStore::new();
        let reporter = ErrorReporter::with_prefix(Arc::new(store.clone()), "errors/");
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let failure = sample_failure();

        let first = reporter.report_at("b", TableName::Jobs, &failure, at).await.unwrap();
        let second = reporter.report_at("b", TableName::Jobs, &failure, at).await.unwrap();

        assert_ne!(first.key, second.key);
        assert!(second.key.ends_with("_1.csv"));
        assert!(first.key.starts_with("errors/errors_table_jobs_batch-2_"));
        assert_eq!(store.keys("b").len(), 2);
    }

    /// Reports every key as free, like a writer that lost a check-then-put race
    struct RacingStore(MemoryStore);

    #[async_trait::async_trait]
    impl ObjectStore for RacingStore {
        async fn get(&self, bucket: &str, key: &str) -> anyhow::Result<Vec<u8>> {
            self.0.get(bucket, key).await
        }

        async fn put(
            &self,
            bucket: &str,
            key: &str,
            data: Vec<u8>,
            content_type: Option<&str>,
        ) -> anyhow::Result<UploadResult> {
            self.0.put(bucket, key, data, content_type).await
        }

        async fn put_new(
            &self,
            bucket: &str,
            key: &str,
            data: Vec<u8>,
            content_type: Option<&str>,
        ) -> anyhow::Result<Option<UploadResult>> {
            self.0.put_new(bucket, key, data, content_type).await
        }

        async fn exists(&self, _bucket: &str, _key: &str) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn list(&self, bucket: &str, prefix: &str) -> anyhow::Result<Vec<String>> {
            self.0.list(bucket, prefix).await
        }
    }

    #[tokio::test]
    async fn test_stale_existence_check_cannot_overwrite() {
        let store = MemoryStore::new();
        let reporter = ErrorReporter::new(Arc::new(RacingStore(store.clone())));
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let failure = sample_failure();

        let first = reporter.report_at("b", TableName::Jobs, &failure, at).await.unwrap();
        let second = reporter.report_at("b", TableName::Jobs, &failure, at).await.unwrap();

        assert_ne!(first.key, second.key);
        assert_eq!(store.keys("b").len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reports_get_distinct_keys() {
        let store = MemoryStore::new();
        let reporter = ErrorReporter::new(Arc::new(store.clone()));
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reporter = reporter.clone();
                tokio::spawn(async move {
                    reporter
                        .report_at("b", TableName::Jobs, &sample_failure(), at)
                        .await
                        .unwrap()
                        .key
                })
            })
            .collect();

        let mut keys = Vec::new();
        for handle in handles {
            keys.push(handle.await.unwrap());
        }
        keys.sort();
        keys.dedup();

        assert_eq!(keys.len(), 8);
        assert_eq!(store.keys("b").len(), 8);
    }

    #[test]
    fn test_to_csv_bytes_quotes_delimiters() {
        let bytes = to_csv_bytes(&[vec!["a,b".to_string(), "c".to_string()]]).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "\"a,b\",c\n");
    }
}
