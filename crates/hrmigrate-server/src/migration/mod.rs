//! Batch validation and idempotent referential load
//!
//! A source file (one table's worth of comma-delimited records) is cut into
//! fixed-size batches. Each batch travels through an invocation channel to
//! the validate/load stage:
//!
//! ```text
//! Dispatcher --(BatchInvoker)--> Pipeline: route -> validate -+-> Loader        -> Passed
//!                                                             +-> ErrorReporter -> Failed
//! ```
//!
//! and the dispatcher records one audit line per batch, written once per
//! source file.
//!
//! Guarantees:
//! - a batch reaches the loader only when every record in it validated
//! - child rows whose parent ids do not exist yet are skipped, not errored
//! - re-delivering a batch never duplicates or rewrites rows (`ON CONFLICT DO NOTHING`)
//! - one batch failing never stops the rest of the file

pub mod dispatch;
pub mod invoke;
pub mod loader;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod table;
pub mod validate;

pub use dispatch::{
    AuditEntry, DispatchConfig, DispatchError, DispatchReport, Dispatcher, AUDIT_HEADER,
};
pub use invoke::{
    BatchInvoker, HttpInvoker, InvocationResponse, InvokeError, LocalInvoker, BATCHES_PATH,
    TRANSPORT_FAILURE_STATUS,
};
pub use loader::{BatchLoader, LoadError, PgLoader};
pub use pipeline::{BatchOutcome, BatchRequest, BatchStatus, OutcomeDetail, Pipeline, PipelineError};
pub use report::{ArtifactRef, ArtifactWriteError, ErrorReporter};
pub use source::{decode_source, partition, Batch, Record, SourceError};
pub use table::{RoutingError, TableKind, TableName};
pub use validate::{
    validate, DefectEntry, ValidationFailure, ValidationOutcome, FAILURE_HEADER, TIMESTAMP_FORMAT,
};

/// Records per batch when nothing else is configured
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Upper bound keeping a child batch under the Postgres bind-parameter limit
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Default key prefix for validation error reports
pub const DEFAULT_ERROR_PREFIX: &str = "logs";

/// Default key prefix for per-file audit logs
pub const DEFAULT_AUDIT_PREFIX: &str = "migration_log";

/// Second-resolution stamp used in artifact keys
pub const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
