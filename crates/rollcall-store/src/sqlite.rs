//! SQLite backend via `rusqlite`.
//!
//! Uniqueness of employee ids and of one attendance record per employee per
//! day is enforced by constraints, so concurrent writers cannot slip a
//! duplicate in between a check and an insert.

use crate::{ensure_parent_dir, Store, StoreError};
use chrono::{Local, NaiveDate, NaiveDateTime};
use rollcall_core::{
    ActivityLogEntry, AdminUser, AttendanceEntry, AttendanceRecord, Employee, EmployeeUpdate,
    NewActivity, STATUS_PRESENT,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS employees (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    employee_id       TEXT NOT NULL UNIQUE,
    full_name         TEXT NOT NULL,
    department        TEXT NOT NULL,
    position          TEXT NOT NULL,
    face_data         TEXT,
    registration_date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    employee_id TEXT NOT NULL REFERENCES employees(employee_id) ON DELETE CASCADE,
    check_in    TEXT NOT NULL,
    check_date  TEXT NOT NULL,
    check_out   TEXT,
    status      TEXT NOT NULL DEFAULT 'present',
    UNIQUE (employee_id, check_date)
);

CREATE INDEX IF NOT EXISTS idx_attendance_check_date ON attendance(check_date);

CREATE TABLE IF NOT EXISTS admin_users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    email         TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS activity_log (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    action     TEXT NOT NULL,
    details    TEXT NOT NULL,
    requester  TEXT,
    created_at TEXT NOT NULL
);
"#;

const EMPLOYEE_COLUMNS: &str =
    "employee_id, full_name, department, position, face_data, registration_date";

/// SQLite-backed [`Store`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        ensure_parent_dir(path)?;
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init(conn)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn employee_from_row(row: &Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        employee_id: row.get(0)?,
        full_name: row.get(1)?,
        department: row.get(2)?,
        position: row.get(3)?,
        face_data: row.get(4)?,
        registration_date: row.get(5)?,
    })
}

fn attendance_from_row(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: row.get(0)?,
        employee_id: row.get(1)?,
        check_in: row.get(2)?,
        check_out: row.get(3)?,
        status: row.get(4)?,
    })
}

fn admin_from_row(row: &Row<'_>) -> rusqlite::Result<AdminUser> {
    Ok(AdminUser {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        email: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityLogEntry> {
    Ok(ActivityLogEntry {
        id: row.get(0)?,
        action: row.get(1)?,
        details: row.get(2)?,
        requester: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Extended result code of a failed statement, if it was a SQLite failure.
fn constraint_code(err: &rusqlite::Error) -> Option<std::os::raw::c_int> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    constraint_code(err) == Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    constraint_code(err) == Some(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
}

impl Store for SqliteStore {
    fn insert_employee(&self, employee: &Employee) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let result = conn.execute(
            &format!("INSERT INTO employees ({EMPLOYEE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                employee.employee_id,
                employee.full_name,
                employee.department,
                employee.position,
                employee.face_data,
                employee.registration_date,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate {
                entity: "employee",
                key: employee.employee_id.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn get_employee(&self, employee_id: &str) -> Result<Option<Employee>, StoreError> {
        let conn = self.lock()?;
        let employee = conn
            .query_row(
                &format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE employee_id = ?1"),
                params![employee_id],
                employee_from_row,
            )
            .optional()?;
        Ok(employee)
    }

    fn list_employees(&self) -> Result<Vec<Employee>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees ORDER BY full_name, employee_id"
        ))?;
        let employees = stmt
            .query_map([], employee_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(employees)
    }

    fn update_employee(
        &self,
        employee_id: &str,
        update: &EmployeeUpdate,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = match &update.face_data {
            Some(face_data) => conn.execute(
                "UPDATE employees SET full_name = ?1, department = ?2, position = ?3, face_data = ?4
                 WHERE employee_id = ?5",
                params![
                    update.full_name,
                    update.department,
                    update.position,
                    face_data,
                    employee_id
                ],
            )?,
            None => conn.execute(
                "UPDATE employees SET full_name = ?1, department = ?2, position = ?3
                 WHERE employee_id = ?4",
                params![update.full_name, update.department, update.position, employee_id],
            )?,
        };
        Ok(changed > 0)
    }

    fn replace_face_data(
        &self,
        employee_id: &str,
        expected: &str,
        face_data: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE employees SET face_data = ?1 WHERE employee_id = ?2 AND face_data = ?3",
            params![face_data, employee_id, expected],
        )?;
        Ok(changed > 0)
    }

    fn delete_employee(&self, employee_id: &str) -> Result<Option<usize>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM attendance WHERE employee_id = ?1",
            params![employee_id],
        )?;
        let deleted = tx.execute(
            "DELETE FROM employees WHERE employee_id = ?1",
            params![employee_id],
        )?;
        if deleted == 0 {
            // Nothing to cascade from; dropping `tx` rolls back.
            return Ok(None);
        }
        tx.commit()?;
        Ok(Some(removed))
    }

    fn count_employees(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM employees", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn insert_attendance(
        &self,
        employee_id: &str,
        check_in: NaiveDateTime,
    ) -> Result<AttendanceRecord, StoreError> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO attendance (employee_id, check_in, check_date, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![employee_id, check_in, check_in.date(), STATUS_PRESENT],
        );
        match result {
            Ok(_) => Ok(AttendanceRecord {
                id: conn.last_insert_rowid(),
                employee_id: employee_id.to_string(),
                check_in,
                check_out: None,
                status: STATUS_PRESENT.to_string(),
            }),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate {
                entity: "attendance",
                key: format!("{employee_id} on {}", check_in.date()),
            }),
            Err(e) if is_foreign_key_violation(&e) => Err(StoreError::MissingReference {
                entity: "employee",
                key: employee_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn has_attendance_on(&self, employee_id: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM attendance WHERE employee_id = ?1 AND check_date = ?2)",
            params![employee_id, date],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn get_attendance(&self, id: i64) -> Result<Option<AttendanceRecord>, StoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT id, employee_id, check_in, check_out, status FROM attendance WHERE id = ?1",
                params![id],
                attendance_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn delete_attendance(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM attendance WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn attendance_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT a.id, a.employee_id, a.check_in, a.check_out, a.status,
                    e.full_name, e.department, e.position
             FROM attendance a
             JOIN employees e ON a.employee_id = e.employee_id
             WHERE a.check_date BETWEEN ?1 AND ?2
             ORDER BY a.check_in DESC, a.id DESC",
        )?;
        let entries = stmt
            .query_map(params![start, end], |row| {
                Ok(AttendanceEntry {
                    record: attendance_from_row(row)?,
                    full_name: row.get(5)?,
                    department: row.get(6)?,
                    position: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn upsert_admin(
        &self,
        username: &str,
        password_hash: &str,
        email: &str,
    ) -> Result<AdminUser, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO admin_users (username, password_hash, email, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(username) DO UPDATE SET
                 password_hash = excluded.password_hash,
                 email = excluded.email",
            params![username, password_hash, email, Local::now().naive_local()],
        )?;
        let admin = conn.query_row(
            "SELECT id, username, password_hash, email, created_at FROM admin_users
             WHERE username = ?1",
            params![username],
            admin_from_row,
        )?;
        Ok(admin)
    }

    fn get_admin(&self, username: &str) -> Result<Option<AdminUser>, StoreError> {
        let conn = self.lock()?;
        let admin = conn
            .query_row(
                "SELECT id, username, password_hash, email, created_at FROM admin_users
                 WHERE username = ?1",
                params![username],
                admin_from_row,
            )
            .optional()?;
        Ok(admin)
    }

    fn append_activity(&self, activity: &NewActivity) -> Result<ActivityLogEntry, StoreError> {
        let conn = self.lock()?;
        let created_at = Local::now().naive_local();
        conn.execute(
            "INSERT INTO activity_log (action, details, requester, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![activity.action, activity.details, activity.requester, created_at],
        )?;
        Ok(ActivityLogEntry {
            id: conn.last_insert_rowid(),
            action: activity.action.clone(),
            details: activity.details.clone(),
            requester: activity.requester.clone(),
            created_at,
        })
    }

    fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityLogEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, action, details, requester, created_at FROM activity_log
             ORDER BY id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = stmt
            .query_map(params![limit], activity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
