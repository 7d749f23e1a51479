//! rollcall-store: Storage port for employees, attendance, admins and the
//! activity log.
//!
//! Two backends implement [`Store`]: a SQLite database and a single JSON
//! document file. A deployment picks one through [`Backend`]; the services
//! never see which.

pub mod document;
pub mod sqlite;

pub use document::DocumentStore;
pub use sqlite::SqliteStore;

use chrono::{NaiveDate, NaiveDateTime};
use rollcall_core::{
    ActivityLogEntry, AdminUser, AttendanceEntry, AttendanceRecord, Employee, EmployeeUpdate,
    NewActivity,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("document encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },
    #[error("{entity} does not exist: {key}")]
    MissingReference { entity: &'static str, key: String },
    #[error("store lock poisoned")]
    Poisoned,
}

/// Persistence operations used by the attendance and employee services.
///
/// Implementations must make [`insert_employee`](Store::insert_employee) and
/// [`insert_attendance`](Store::insert_attendance) atomic insert-if-absent
/// operations: two racing callers can never both succeed.
pub trait Store: Send + Sync {
    /// Insert a new employee. Fails with [`StoreError::Duplicate`] if the id is taken.
    fn insert_employee(&self, employee: &Employee) -> Result<(), StoreError>;

    fn get_employee(&self, employee_id: &str) -> Result<Option<Employee>, StoreError>;

    /// All employees ordered by full name.
    fn list_employees(&self) -> Result<Vec<Employee>, StoreError>;

    /// Apply an admin edit. Returns `false` if the employee does not exist.
    fn update_employee(&self, employee_id: &str, update: &EmployeeUpdate)
        -> Result<bool, StoreError>;

    /// Replace the stored face payload, but only while it still equals
    /// `expected`. Returns `false` if the employee is gone or its payload
    /// changed since it was read.
    fn replace_face_data(
        &self,
        employee_id: &str,
        expected: &str,
        face_data: &str,
    ) -> Result<bool, StoreError>;

    /// Delete an employee and every attendance record referencing it.
    ///
    /// Returns the number of attendance records removed, or `None` if the
    /// employee does not exist.
    fn delete_employee(&self, employee_id: &str) -> Result<Option<usize>, StoreError>;

    fn count_employees(&self) -> Result<u64, StoreError>;

    /// Record a check-in. Fails with [`StoreError::Duplicate`] if the employee
    /// already has a record on the same calendar date, and with
    /// [`StoreError::MissingReference`] if the employee does not exist.
    fn insert_attendance(
        &self,
        employee_id: &str,
        check_in: NaiveDateTime,
    ) -> Result<AttendanceRecord, StoreError>;

    fn has_attendance_on(&self, employee_id: &str, date: NaiveDate) -> Result<bool, StoreError>;

    fn get_attendance(&self, id: i64) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Hard delete. Returns `false` if no such record.
    fn delete_attendance(&self, id: i64) -> Result<bool, StoreError>;

    /// Records with a check-in date in `start..=end`, joined with their
    /// employee, newest first.
    fn attendance_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, StoreError>;

    /// Create the admin, or replace the password hash and email of an existing one.
    fn upsert_admin(
        &self,
        username: &str,
        password_hash: &str,
        email: &str,
    ) -> Result<AdminUser, StoreError>;

    fn get_admin(&self, username: &str) -> Result<Option<AdminUser>, StoreError>;

    fn append_activity(&self, activity: &NewActivity) -> Result<ActivityLogEntry, StoreError>;

    /// Most recent entries first.
    fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityLogEntry>, StoreError>;
}

/// Which concrete store a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Json,
}

impl Backend {
    /// Default database file name for this backend.
    pub fn default_file_name(&self) -> &'static str {
        match self {
            Backend::Sqlite => "attendance.db",
            Backend::Json => "attendance.json",
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "json" | "document" => Ok(Backend::Json),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

/// Open the configured backend at `path`.
pub fn open(backend: Backend, path: &Path) -> Result<Arc<dyn Store>, StoreError> {
    let store: Arc<dyn Store> = match backend {
        Backend::Sqlite => Arc::new(SqliteStore::open(path)?),
        Backend::Json => Arc::new(DocumentStore::open(path)?),
    };
    tracing::info!(?backend, path = %path.display(), "store opened");
    Ok(store)
}

/// Create the parent directory of a database file if needed.
fn ensure_parent_dir(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}
