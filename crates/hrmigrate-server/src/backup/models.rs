//! Row models for table backups

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key prefix under which backup folders live
pub const BACKUP_PREFIX: &str = "backups_tables";

/// Rows per `INSERT` during restore. Five binds per child row keeps a chunk
/// well under the 65535 bind-parameter limit.
pub const RESTORE_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DepartmentRow {
    pub id: i32,
    pub department: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRow {
    pub id: i32,
    pub job: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HiredEmployeeRow {
    pub id: i32,
    pub name: String,
    pub datetime: DateTime<Utc>,
    pub department_id: i32,
    pub job_id: i32,
}

/// Where an export landed and how many rows each table contributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSummary {
    /// Folder key, e.g. `backups_tables/tables_backup_2024-03-01_12-30-05`
    pub folder: String,
    pub departments: usize,
    pub jobs: usize,
    pub hired_employees: usize,
}

impl BackupSummary {
    pub fn total(&self) -> usize {
        self.departments + self.jobs + self.hired_employees
    }
}
