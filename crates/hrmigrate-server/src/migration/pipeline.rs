//! The validate/load stage
//!
//! Handles exactly one batch: route the table name, validate every record,
//! then either load the batch or write its error report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::loader::BatchLoader;
use super::report::{ArtifactRef, ArtifactWriteError, ErrorReporter};
use super::source::{Batch, Record};
use super::table::TableName;
use super::validate::{validate, ValidationOutcome};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    ArtifactWrite(#[from] ArtifactWriteError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One batch as it travels over the invocation channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub bucket: String,
    pub source_key: String,
    /// Unvalidated table identifier
    pub table: String,
    pub batch_id: u32,
    pub rows: Vec<Record>,
}

impl BatchRequest {
    pub fn new(
        bucket: impl Into<String>,
        source_key: impl Into<String>,
        table: impl Into<String>,
        batch: Batch,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            source_key: source_key.into(),
            table: table.into(),
            batch_id: batch.batch_id,
            rows: batch.records,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Passed,
    Failed,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Passed => f.write_str("Passed"),
            BatchStatus::Failed => f.write_str("Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeDetail {
    Loaded { affected_rows: u64 },
    ValidationFailed { artifact: ArtifactRef, defective_rows: usize },
    RoutingFailed { table: String },
    LoadFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch_id: u32,
    pub status: BatchStatus,
    pub detail: OutcomeDetail,
}

impl BatchOutcome {
    fn passed(batch_id: u32, affected_rows: u64) -> Self {
        Self {
            batch_id,
            status: BatchStatus::Passed,
            detail: OutcomeDetail::Loaded { affected_rows },
        }
    }

    fn failed(batch_id: u32, detail: OutcomeDetail) -> Self {
        Self {
            batch_id,
            status: BatchStatus::Failed,
            detail,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == BatchStatus::Passed
    }

    /// Human-readable one-liner
    pub fn summary(&self) -> String {
        match &self.detail {
            OutcomeDetail::Loaded { affected_rows } => {
                format!("Batch {} loaded: {} rows inserted", self.batch_id, affected_rows)
            },
            OutcomeDetail::ValidationFailed { artifact, defective_rows } => format!(
                "Batch {} failed validation: {} defective rows, report at s3://{}/{}",
                self.batch_id, defective_rows, artifact.bucket, artifact.key
            ),
            OutcomeDetail::RoutingFailed { table } => {
                format!("Batch {} not routed: unknown table '{}'", self.batch_id, table)
            },
            OutcomeDetail::LoadFailed { reason } => {
                format!("Batch {} failed to load: {}", self.batch_id, reason)
            },
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    loader: Arc<dyn BatchLoader>,
    reporter: ErrorReporter,
}

impl Pipeline {
    pub fn new(loader: Arc<dyn BatchLoader>, reporter: ErrorReporter) -> Self {
        Self { loader, reporter }
    }

    #[instrument(skip(self, request), fields(table = %request.table, batch_id = request.batch_id))]
    pub async fn process(&self, request: BatchRequest) -> Result<BatchOutcome, PipelineError> {
        let BatchRequest { bucket, table, batch_id, rows, .. } = request;

        let table_name = match table.parse::<TableName>() {
            Ok(name) => name,
            Err(e) => {
                warn!(error = %e, "Batch not routed");
                return Ok(BatchOutcome::failed(batch_id, OutcomeDetail::RoutingFailed { table }));
            },
        };

        let batch = Batch::new(batch_id, rows);

        if let ValidationOutcome::Failure(failure) = validate(table_name.kind(), &batch) {
            let defective_rows = failure.defective_rows();
            let artifact = self.reporter.report(&bucket, table_name, &failure).await?;
            warn!(defective_rows, "Batch failed validation");
            return Ok(BatchOutcome::failed(
                batch_id,
                OutcomeDetail::ValidationFailed { artifact, defective_rows },
            ));
        }

        match self.loader.load(table_name, &batch.records).await {
            Ok(affected_rows) => {
                info!(affected_rows, "Batch loaded");
                Ok(BatchOutcome::passed(batch_id, affected_rows))
            },
            Err(e) => {
                warn!(error = %e, "Batch load failed");
                Ok(BatchOutcome::failed(batch_id, OutcomeDetail::LoadFailed { reason: e.to_string() }))
            },
        }
    }
}
