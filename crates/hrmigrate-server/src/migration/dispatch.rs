//! Batching and dispatch of a whole source file
//!
//! The file is partitioned into numbered batches, each batch is handed to a
//! [`BatchInvoker`], and one audit line per batch is collected. The audit log
//! is written once, after every batch has come back, in `batch_id` order no
//! matter how many batches were in flight.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use super::invoke::BatchInvoker;
use super::pipeline::{BatchOutcome, BatchRequest};
use super::report::{write_csv, ArtifactRef, ArtifactWriteError};
use super::source::{decode_source, partition, Record, SourceError};
use super::table::{RoutingError, TableName};
use super::{ARTIFACT_TIMESTAMP_FORMAT, DEFAULT_AUDIT_PREFIX, DEFAULT_BATCH_SIZE};
use crate::storage::ObjectStore;

/// Column headers of the audit log
pub const AUDIT_HEADER: [&str; 4] = ["Batch_Id", "Batch_Size", "Status", "Body"];

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to read source s3://{bucket}/{key}: {source}")]
    Read {
        bucket: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to decode source: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    AuditWrite(#[from] ArtifactWriteError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    pub batch_size: usize,
    /// Batches in flight at once
    pub concurrency: usize,
    pub audit_prefix: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: 1,
            audit_prefix: DEFAULT_AUDIT_PREFIX.to_string(),
        }
    }
}

/// One line of the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub batch_id: u32,
    pub batch_size: usize,
    /// HTTP-style status of the invocation, 0 when it never got a response
    pub invocation_status: u16,
    pub response_body: String,
}

impl AuditEntry {
    /// The batch counts as passed only when the channel answered 2xx with an
    /// outcome whose status is `Passed`. Any other body is a failure.
    pub fn is_passed(&self) -> bool {
        (200..300).contains(&self.invocation_status)
            && serde_json::from_str::<BatchOutcome>(&self.response_body)
                .is_ok_and(|outcome| outcome.is_passed())
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.batch_id.to_string(),
            self.batch_size.to_string(),
            self.invocation_status.to_string(),
            self.response_body.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub table: String,
    pub entries: Vec<AuditEntry>,
    pub audit_artifact: ArtifactRef,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.is_passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    invoker: Arc<dyn BatchInvoker>,
    store: Arc<dyn ObjectStore>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        invoker: Arc<dyn BatchInvoker>,
        store: Arc<dyn ObjectStore>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            invoker,
            store,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Read `source_key` from the store and dispatch it. Without an explicit
    /// `table`, the table is the file stem of the key.
    #[instrument(skip(self))]
    pub async fn dispatch_object(
        &self,
        bucket: &str,
        source_key: &str,
        table: Option<&str>,
    ) -> Result<DispatchReport, DispatchError> {
        let table = match table {
            Some(table) => table.to_string(),
            None => TableName::from_source_key(source_key)?.to_string(),
        };

        let bytes = self
            .store
            .get(bucket, source_key)
            .await
            .map_err(|source| DispatchError::Read {
                bucket: bucket.to_string(),
                key: source_key.to_string(),
                source,
            })?;
        let records = decode_source(bytes)?;

        self.dispatch(bucket, source_key, &table, records).await
    }

    pub async fn dispatch(
        &self,
        bucket: &str,
        source_key: &str,
        table: &str,
        records: Vec<Record>,
    ) -> Result<DispatchReport, DispatchError> {
        self.dispatch_at(bucket, source_key, table, records, Utc::now()).await
    }

    /// Dispatch with an explicit audit timestamp.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn dispatch_at(
        &self,
        bucket: &str,
        source_key: &str,
        table: &str,
        records: Vec<Record>,
        at: DateTime<Utc>,
    ) -> Result<DispatchReport, DispatchError> {
        let batches = partition(records, self.config.batch_size);
        let total = batches.len();
        let concurrency = self.config.concurrency.max(1);

        info!(
            batches = total,
            batch_size = self.config.batch_size,
            concurrency,
            "Dispatching source file"
        );

        let mut entries: Vec<AuditEntry> = stream::iter(batches)
            .map(|batch| {
                let invoker = Arc::clone(&self.invoker);
                let batch_id = batch.batch_id;
                let batch_size = batch.len();
                let request = BatchRequest::new(bucket, source_key, table, batch);

                async move {
                    let response = invoker.invoke(request).await;
                    let entry = AuditEntry {
                        batch_id,
                        batch_size,
                        invocation_status: response.status,
                        response_body: response.body,
                    };
                    if entry.is_passed() {
                        info!(batch_id, total, status = entry.invocation_status, "Batch loaded");
                    } else if (200..300).contains(&entry.invocation_status) {
                        warn!(batch_id, total, body = %entry.response_body, "Batch rejected");
                    } else {
                        error!(
                            batch_id,
                            total,
                            status = entry.invocation_status,
                            body = %entry.response_body,
                            "Batch invocation failed"
                        );
                    }
                    entry
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        entries.sort_by_key(|e| e.batch_id);

        let stem = format!(
            "{}/log_migration_history_table_{}_{}",
            self.config.audit_prefix.trim_end_matches('/'),
            table,
            at.format(ARTIFACT_TIMESTAMP_FORMAT)
        );
        let header: Vec<String> = AUDIT_HEADER.iter().map(|h| h.to_string()).collect();
        let rows: Vec<Vec<String>> = std::iter::once(header)
            .chain(entries.iter().map(AuditEntry::to_record))
            .collect();
        let audit_artifact = write_csv(self.store.as_ref(), bucket, &stem, &rows).await?;

        let report = DispatchReport {
            table: table.to_string(),
            entries,
            audit_artifact,
        };

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            audit_key = %report.audit_artifact.key,
            "Dispatch complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::migration::invoke::InvocationResponse;
    use crate::migration::pipeline::{BatchStatus, OutcomeDetail};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fails every batch whose id is listed, answers 200 otherwise
    #[derive(Default)]
    struct ScriptedInvoker {
        fail: Vec<u32>,
        seen: Mutex<Vec<(u32, usize)>>,
    }

    #[async_trait]
    impl BatchInvoker for ScriptedInvoker {
        async fn invoke(&self, request: BatchRequest) -> InvocationResponse {
            // Later batches finish first so ordering is exercised
            tokio::time::sleep(Duration::from_millis(u64::from(10 - request.batch_id.min(10)))).await;
            self.seen.lock().unwrap().push((request.batch_id, request.rows.len()));
            if self.fail.contains(&request.batch_id) {
                InvocationResponse::new(500, "boom")
            } else {
                let outcome = BatchOutcome {
                    batch_id: request.batch_id,
                    status: BatchStatus::Passed,
                    detail: OutcomeDetail::Loaded {
                        affected_rows: request.rows.len() as u64,
                    },
                };
                InvocationResponse::new(200, serde_json::to_string(&outcome).unwrap())
            }
        }
    }

    fn records(n: usize) -> Vec<Record> {
        (1..=n).map(|i| Record::new([i.to_string(), format!("Dept {i}")])).collect()
    }

    fn dispatcher(
        invoker: Arc<ScriptedInvoker>,
        store: &MemoryStore,
        concurrency: usize,
    ) -> Dispatcher {
        Dispatcher::new(
            invoker,
            Arc::new(store.clone()),
            DispatchConfig {
                concurrency,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_block_the_rest() {
        let invoker = Arc::new(ScriptedInvoker {
            fail: vec![2],
            ..Default::default()
        });
        let store = MemoryStore::new();

        let report = dispatcher(invoker.clone(), &store, 1)
            .dispatch("bucket", "data/departments.csv", "departments", records(120))
            .await
            .unwrap();

        let statuses: Vec<(u32, usize, u16)> = report
            .entries
            .iter()
            .map(|e| (e.batch_id, e.batch_size, e.invocation_status))
            .collect();
        assert_eq!(statuses, vec![(1, 50, 200), (2, 50, 500), (3, 20, 200)]);
        assert_eq!(report.failed(), 1);
        assert_eq!(invoker.seen.lock().unwrap().len(), 3);
    }

    fn entry(status: u16, body: &str) -> AuditEntry {
        AuditEntry {
            batch_id: 1,
            batch_size: 1,
            invocation_status: status,
            response_body: body.to_string(),
        }
    }

    #[test]
    fn test_rejected_batch_counts_as_failed() {
        let rejected = r#"{"batch_id":1,"status":"Failed","detail":{"kind":"routing_failed","table":"x"}}"#;
        let loaded = r#"{"batch_id":1,"status":"Passed","detail":{"kind":"loaded","affected_rows":3}}"#;

        assert!(entry(200, loaded).is_passed());
        assert!(!entry(200, rejected).is_passed());
        assert!(!entry(200, "ok").is_passed());
        assert!(!entry(500, loaded).is_passed());
        assert!(!entry(0, "connection refused").is_passed());
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_keeps_audit_order() {
        let invoker = Arc::new(ScriptedInvoker::default());
        let store = MemoryStore::new();

        let report = dispatcher(invoker.clone(), &store, 4)
            .dispatch("bucket", "jobs.csv", "jobs", records(7 * 50))
            .await
            .unwrap();

        let ids: Vec<u32> = report.entries.iter().map(|e| e.batch_id).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_audit_log_written_once() {
        let invoker = Arc::new(ScriptedInvoker::default());
        let store = MemoryStore::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();

        let report = dispatcher(invoker, &store, 1)
            .dispatch_at("bucket", "jobs.csv", "jobs", records(60), at)
            .await
            .unwrap();

        assert_eq!(
            report.audit_artifact.key,
            "migration_log/log_migration_history_table_jobs_2024-05-06_07-08-09.csv"
        );
        assert_eq!(store.keys("bucket"), vec![report.audit_artifact.key.clone()]);

        let bytes = store.get("bucket", &report.audit_artifact.key).await.unwrap();
        let body = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "Batch_Id,Batch_Size,Status,Body");
        assert!(lines[1].starts_with("1,50,200,"));
        assert!(lines[2].starts_with("2,10,200,"));
        assert!(lines[2].contains("\"\"affected_rows\"\":10"));
    }

    #[tokio::test]
    async fn test_dispatch_object_routes_by_file_stem() {
        let invoker = Arc::new(ScriptedInvoker::default());
        let store = MemoryStore::new();
        store.insert("bucket", "data/jobs.csv", "1,Engineer\n2,Analyst\n");

        let report = dispatcher(invoker.clone(), &store, 1)
            .dispatch_object("bucket", "data/jobs.csv", None)
            .await
            .unwrap();

        assert_eq!(report.table, "jobs");
        assert_eq!(*invoker.seen.lock().unwrap(), vec![(1, 2)]);
    }

    #[tokio::test]
    async fn test_dispatch_object_rejects_unroutable_key() {
        let invoker = Arc::new(ScriptedInvoker::default());
        let store = MemoryStore::new();

        let result = dispatcher(invoker, &store, 1)
            .dispatch_object("bucket", "data/employees.csv", None)
            .await;

        assert!(matches!(result, Err(DispatchError::Routing(RoutingError::UnknownTable(_)))));
    }

    #[tokio::test]
    async fn test_missing_source_is_read_error() {
        let invoker = Arc::new(ScriptedInvoker::default());
        let store = MemoryStore::new();

        let result = dispatcher(invoker, &store, 1)
            .dispatch_object("bucket", "data/jobs.csv", Some("jobs"))
            .await;

        assert!(matches!(result, Err(DispatchError::Read { .. })));
    }
}
