//! Table routing
//!
//! Maps a table identifier to everything the pipeline needs to know about
//! it: which validation rules apply, which columns exist and which parents
//! must already hold a referenced id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("Unknown table '{0}': expected one of hired_employees, departments, jobs")]
    UnknownTable(String),

    #[error("Cannot derive a table name from object key '{0}'")]
    UnroutableKey(String),
}

/// Rule set selector for validation and loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Two columns: id, label
    Lookup,
    /// Five columns: id, name, datetime, department_id, job_id
    Child,
}

impl TableKind {
    pub fn arity(self) -> usize {
        match self {
            TableKind::Lookup => 2,
            TableKind::Child => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    HiredEmployees,
    Departments,
    Jobs,
}

impl TableName {
    pub const ALL: [TableName; 3] = [TableName::Departments, TableName::Jobs, TableName::HiredEmployees];

    pub fn as_str(self) -> &'static str {
        match self {
            TableName::HiredEmployees => "hired_employees",
            TableName::Departments => "departments",
            TableName::Jobs => "jobs",
        }
    }

    pub fn kind(self) -> TableKind {
        match self {
            TableName::HiredEmployees => TableKind::Child,
            TableName::Departments | TableName::Jobs => TableKind::Lookup,
        }
    }

    /// Label column of a lookup table
    pub fn label_column(self) -> Option<&'static str> {
        match self {
            TableName::Departments => Some("department"),
            TableName::Jobs => Some("job"),
            TableName::HiredEmployees => None,
        }
    }

    /// Route an object key such as `data/hired_employees.csv` by its file stem.
    /// A key with no file name after its last `/` is unroutable.
    pub fn from_source_key(key: &str) -> Result<Self, RoutingError> {
        let file_name = key.rsplit('/').next().unwrap_or_default();
        let stem = std::path::Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RoutingError::UnroutableKey(key.to_string()))?;

        stem.parse()
    }
}

impl FromStr for TableName {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hired_employees" => Ok(TableName::HiredEmployees),
            "departments" => Ok(TableName::Departments),
            "jobs" => Ok(TableName::Jobs),
            other => Err(RoutingError::UnknownTable(other.to_string())),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
