//! Per-record validation
//!
//! Every record of a batch is classified against the rule set of its table
//! kind. Defects are collected per row without short-circuiting, except that
//! a row with the wrong number of fields gets a single "malformed" defect
//! and no field checks. A batch passes only when no row has a defect.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::source::{Batch, Record};
use super::table::TableKind;

/// Accepted timestamp shape: UTC, second resolution, literal `Z`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Column headers of a rendered failure
pub const FAILURE_HEADER: [&str; 3] = ["Batch_Id", "Row", "Errors"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Integer,
    /// Any text, including empty
    Text,
    NonEmptyText,
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
struct FieldRule {
    name: &'static str,
    check: Check,
}

const LOOKUP_RULES: [FieldRule; 2] = [
    FieldRule { name: "id", check: Check::Integer },
    FieldRule { name: "label", check: Check::Text },
];

const CHILD_RULES: [FieldRule; 5] = [
    FieldRule { name: "id", check: Check::Integer },
    FieldRule { name: "name", check: Check::NonEmptyText },
    FieldRule { name: "datetime", check: Check::Timestamp },
    FieldRule { name: "department_id", check: Check::Integer },
    FieldRule { name: "job_id", check: Check::Integer },
];

fn rules(kind: TableKind) -> &'static [FieldRule] {
    match kind {
        TableKind::Lookup => &LOOKUP_RULES,
        TableKind::Child => &CHILD_RULES,
    }
}

/// Parse an id-like field. Surrounding whitespace is tolerated; the value
/// must fit the 32-bit `integer` columns it lands in.
pub fn parse_int(raw: &str) -> Option<i32> {
    raw.trim().parse().ok()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// One row of a failed batch and what was wrong with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectEntry {
    pub batch_id: u32,
    /// Raw row rendering
    pub row: String,
    /// Empty when the row itself was fine
    pub defects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub batch_id: u32,
    /// One entry per record, in batch order
    pub entries: Vec<DefectEntry>,
}

impl ValidationFailure {
    pub fn defective_rows(&self) -> usize {
        self.entries.iter().filter(|e| !e.defects.is_empty()).count()
    }

    /// Header record followed by one record per row
    pub fn to_table(&self) -> Vec<Vec<String>> {
        let header = FAILURE_HEADER.iter().map(|h| h.to_string()).collect();
        std::iter::once(header)
            .chain(self.entries.iter().map(|e| {
                vec![e.batch_id.to_string(), e.row.clone(), e.defects.join("; ")]
            }))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Pass,
    Failure(ValidationFailure),
}

impl ValidationOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, ValidationOutcome::Pass)
    }
}

fn check_record(kind: TableKind, record: &Record) -> Vec<String> {
    let rules = rules(kind);
    if record.arity() != rules.len() {
        return vec![format!(
            "Validation Error: Data malformed, expected {} fields but found {}",
            rules.len(),
            record.arity()
        )];
    }

    rules
        .iter()
        .zip(record.fields())
        .enumerate()
        .filter_map(|(index, (rule, value))| {
            let position = index + 1;
            let defect = match rule.check {
                Check::Integer if parse_int(value).is_none() => "should be an integer",
                Check::NonEmptyText if value.is_empty() => "should be a non-empty string",
                Check::Timestamp if parse_timestamp(value).is_none() => {
                    "should be a datetime in ISO format (YYYY-MM-DDTHH:MM:SSZ)"
                },
                _ => return None,
            };
            Some(format!("Validation Error: {} (field {}) {}", rule.name, position, defect))
        })
        .collect()
}

/// Classify every record of `batch` against the rules for `kind`.
pub fn validate(kind: TableKind, batch: &Batch) -> ValidationOutcome {
    let entries: Vec<DefectEntry> = batch
        .records
        .iter()
        .map(|record| DefectEntry {
            batch_id: batch.batch_id,
            row: record.render(),
            defects: check_record(kind, record),
        })
        .collect();

    if entries.iter().all(|e| e.defects.is_empty()) {
        ValidationOutcome::Pass
    } else {
        ValidationOutcome::Failure(ValidationFailure {
            batch_id: batch.batch_id,
            entries,
        })
    }
}
