//! Single-file JSON document backend.
//!
//! The whole data set lives in one JSON document (`employees`, `attendance`,
//! `admin_users`, `activity_log`). Every mutation runs under one lock against
//! a copy of the document, which is written to a temporary file and renamed
//! over the original before the in-memory state is replaced.

use crate::{ensure_parent_dir, Store, StoreError};
use chrono::{Local, NaiveDate, NaiveDateTime};
use rollcall_core::{
    ActivityLogEntry, AdminUser, AttendanceEntry, AttendanceRecord, Employee, EmployeeUpdate,
    NewActivity, STATUS_PRESENT,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    employees: Vec<Employee>,
    #[serde(default)]
    attendance: Vec<AttendanceRecord>,
    #[serde(default)]
    admin_users: Vec<AdminUser>,
    #[serde(default)]
    activity_log: Vec<ActivityLogEntry>,
    /// Last id handed out per collection; ids are never reused.
    #[serde(default)]
    last_ids: LastIds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LastIds {
    #[serde(default)]
    attendance: i64,
    #[serde(default)]
    admin_users: i64,
    #[serde(default)]
    activity_log: i64,
}

impl Document {
    fn employee(&self, employee_id: &str) -> Option<&Employee> {
        self.employees.iter().find(|e| e.employee_id == employee_id)
    }

    fn employee_mut(&mut self, employee_id: &str) -> Option<&mut Employee> {
        self.employees
            .iter_mut()
            .find(|e| e.employee_id == employee_id)
    }

    fn admin(&self, username: &str) -> Option<&AdminUser> {
        self.admin_users.iter().find(|a| a.username == username)
    }

    /// Raise counters to at least the highest id present, for documents
    /// written by hand or by older versions without `last_ids`.
    fn reconcile_ids(&mut self) {
        let max_attendance = self.attendance.iter().map(|r| r.id).max().unwrap_or(0);
        let max_admin = self.admin_users.iter().map(|a| a.id).max().unwrap_or(0);
        let max_activity = self.activity_log.iter().map(|a| a.id).max().unwrap_or(0);
        self.last_ids.attendance = self.last_ids.attendance.max(max_attendance);
        self.last_ids.admin_users = self.last_ids.admin_users.max(max_admin);
        self.last_ids.activity_log = self.last_ids.activity_log.max(max_activity);
    }
}

/// JSON-file-backed [`Store`].
pub struct DocumentStore {
    path: PathBuf,
    doc: Mutex<Document>,
}

impl DocumentStore {
    /// Load the document at `path`, starting empty if the file does not exist.
    ///
    /// A file that exists but does not parse is an error; it is never
    /// silently replaced.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        ensure_parent_dir(path)?;
        let mut doc = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice::<Document>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no document yet; starting empty");
                Document::default()
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        doc.reconcile_ids();

        Ok(Self {
            path: path.to_path_buf(),
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Document>, StoreError> {
        self.doc.lock().map_err(|_| StoreError::Poisoned)
    }

    fn read<T>(&self, f: impl FnOnce(&Document) -> T) -> Result<T, StoreError> {
        let doc = self.lock()?;
        Ok(f(&doc))
    }

    /// Apply `f` to a copy of the document, persist it, then publish it.
    ///
    /// If `f` or the write fails the in-memory document is left untouched.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Document) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut doc = self.lock()?;
        let mut next = doc.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *doc = next;
        Ok(out)
    }

    fn persist(&self, doc: &Document) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };
        std::fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
        std::fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;
        Ok(())
    }
}

impl Store for DocumentStore {
    fn insert_employee(&self, employee: &Employee) -> Result<(), StoreError> {
        self.mutate(|doc| {
            if doc.employee(&employee.employee_id).is_some() {
                return Err(StoreError::Duplicate {
                    entity: "employee",
                    key: employee.employee_id.clone(),
                });
            }
            doc.employees.push(employee.clone());
            Ok(())
        })
    }

    fn get_employee(&self, employee_id: &str) -> Result<Option<Employee>, StoreError> {
        self.read(|doc| doc.employee(employee_id).cloned())
    }

    fn list_employees(&self) -> Result<Vec<Employee>, StoreError> {
        self.read(|doc| {
            let mut employees = doc.employees.clone();
            employees.sort_by(|a, b| {
                a.full_name
                    .cmp(&b.full_name)
                    .then_with(|| a.employee_id.cmp(&b.employee_id))
            });
            employees
        })
    }

    fn update_employee(
        &self,
        employee_id: &str,
        update: &EmployeeUpdate,
    ) -> Result<bool, StoreError> {
        if self.read(|doc| doc.employee(employee_id).is_none())? {
            return Ok(false);
        }
        self.mutate(|doc| {
            let Some(employee) = doc.employee_mut(employee_id) else {
                return Ok(false);
            };
            employee.full_name = update.full_name.clone();
            employee.department = update.department.clone();
            employee.position = update.position.clone();
            if let Some(face_data) = &update.face_data {
                employee.face_data = Some(face_data.clone());
            }
            Ok(true)
        })
    }

    fn replace_face_data(
        &self,
        employee_id: &str,
        expected: &str,
        face_data: &str,
    ) -> Result<bool, StoreError> {
        let holds_expected = |doc: &Document| {
            doc.employee(employee_id)
                .is_some_and(|e| e.face_data.as_deref() == Some(expected))
        };
        if !self.read(holds_expected)? {
            return Ok(false);
        }
        self.mutate(|doc| {
            if !holds_expected(doc) {
                return Ok(false);
            }
            let Some(employee) = doc.employee_mut(employee_id) else {
                return Ok(false);
            };
            employee.face_data = Some(face_data.to_string());
            Ok(true)
        })
    }

    fn delete_employee(&self, employee_id: &str) -> Result<Option<usize>, StoreError> {
        if self.read(|doc| doc.employee(employee_id).is_none())? {
            return Ok(None);
        }
        self.mutate(|doc| {
            let before = doc.employees.len();
            doc.employees.retain(|e| e.employee_id != employee_id);
            if doc.employees.len() == before {
                return Ok(None);
            }
            let records_before = doc.attendance.len();
            doc.attendance.retain(|r| r.employee_id != employee_id);
            Ok(Some(records_before - doc.attendance.len()))
        })
    }

    fn count_employees(&self) -> Result<u64, StoreError> {
        self.read(|doc| doc.employees.len() as u64)
    }

    fn insert_attendance(
        &self,
        employee_id: &str,
        check_in: NaiveDateTime,
    ) -> Result<AttendanceRecord, StoreError> {
        self.mutate(|doc| {
            if doc.employee(employee_id).is_none() {
                return Err(StoreError::MissingReference {
                    entity: "employee",
                    key: employee_id.to_string(),
                });
            }
            let date = check_in.date();
            if doc
                .attendance
                .iter()
                .any(|r| r.employee_id == employee_id && r.date() == date)
            {
                return Err(StoreError::Duplicate {
                    entity: "attendance",
                    key: format!("{employee_id} on {date}"),
                });
            }
            doc.last_ids.attendance += 1;
            let record = AttendanceRecord {
                id: doc.last_ids.attendance,
                employee_id: employee_id.to_string(),
                check_in,
                check_out: None,
                status: STATUS_PRESENT.to_string(),
            };
            doc.attendance.push(record.clone());
            Ok(record)
        })
    }

    fn has_attendance_on(&self, employee_id: &str, date: NaiveDate) -> Result<bool, StoreError> {
        self.read(|doc| {
            doc.attendance
                .iter()
                .any(|r| r.employee_id == employee_id && r.date() == date)
        })
    }

    fn get_attendance(&self, id: i64) -> Result<Option<AttendanceRecord>, StoreError> {
        self.read(|doc| doc.attendance.iter().find(|r| r.id == id).cloned())
    }

    fn delete_attendance(&self, id: i64) -> Result<bool, StoreError> {
        if self.read(|doc| doc.attendance.iter().all(|r| r.id != id))? {
            return Ok(false);
        }
        self.mutate(|doc| {
            let before = doc.attendance.len();
            doc.attendance.retain(|r| r.id != id);
            Ok(doc.attendance.len() < before)
        })
    }

    fn attendance_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        self.read(|doc| {
            let mut entries: Vec<AttendanceEntry> = doc
                .attendance
                .iter()
                .filter(|r| (start..=end).contains(&r.date()))
                .filter_map(|r| {
                    let employee = doc.employee(&r.employee_id)?;
                    Some(AttendanceEntry {
                        record: r.clone(),
                        full_name: employee.full_name.clone(),
                        department: employee.department.clone(),
                        position: employee.position.clone(),
                    })
                })
                .collect();
            entries.sort_by(|a, b| {
                b.record
                    .check_in
                    .cmp(&a.record.check_in)
                    .then_with(|| b.record.id.cmp(&a.record.id))
            });
            entries
        })
    }

    fn upsert_admin(
        &self,
        username: &str,
        password_hash: &str,
        email: &str,
    ) -> Result<AdminUser, StoreError> {
        self.mutate(|doc| {
            if let Some(admin) = doc.admin_users.iter_mut().find(|a| a.username == username) {
                admin.password_hash = password_hash.to_string();
                admin.email = email.to_string();
                return Ok(admin.clone());
            }
            doc.last_ids.admin_users += 1;
            let admin = AdminUser {
                id: doc.last_ids.admin_users,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                email: email.to_string(),
                created_at: Local::now().naive_local(),
            };
            doc.admin_users.push(admin.clone());
            Ok(admin)
        })
    }

    fn get_admin(&self, username: &str) -> Result<Option<AdminUser>, StoreError> {
        self.read(|doc| doc.admin(username).cloned())
    }

    fn append_activity(&self, activity: &NewActivity) -> Result<ActivityLogEntry, StoreError> {
        self.mutate(|doc| {
            doc.last_ids.activity_log += 1;
            let entry = ActivityLogEntry {
                id: doc.last_ids.activity_log,
                action: activity.action.clone(),
                details: activity.details.clone(),
                requester: activity.requester.clone(),
                created_at: Local::now().naive_local(),
            };
            doc.activity_log.push(entry.clone());
            Ok(entry)
        })
    }

    fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityLogEntry>, StoreError> {
        self.read(|doc| doc.activity_log.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract;

    #[test]
    fn test_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let counter = std::cell::Cell::new(0);
        contract::run_all(|| {
            counter.set(counter.get() + 1);
            let path = dir.path().join(format!("doc-{}.json", counter.get()));
            Box::new(DocumentStore::open(&path).unwrap())
        });
    }

    #[test]
    fn test_reopen_keeps_data_and_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.json");
        let first_id = {
            let store = DocumentStore::open(&path).unwrap();
            store
                .insert_employee(&contract::employee("E1", "Ada", "R&D"))
                .unwrap();
            let record = store
                .insert_attendance("E1", contract::at("2024-03-01", "09:00:00"))
                .unwrap();
            store.delete_attendance(record.id).unwrap();
            record.id
        };

        let store = DocumentStore::open(&path).unwrap();
        assert_eq!(store.count_employees().unwrap(), 1);
        let record = store
            .insert_attendance("E1", contract::at("2024-03-01", "09:30:00"))
            .unwrap();
        assert!(record.id > first_id, "ids must not be reused");
    }

    #[test]
    fn test_corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            DocumentStore::open(&path),
            Err(StoreError::Json(_))
        ));
    }

    #[test]
    fn test_unchanged_face_replace_skips_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.json");
        let store = DocumentStore::open(&path).unwrap();

        assert!(!store.replace_face_data("ghost", "old", "new").unwrap());
        assert!(!path.exists(), "no write expected for an unknown employee");

        store
            .insert_employee(&contract::employee("E1", "Ada", "R&D"))
            .unwrap();
        std::fs::write(&path, b"sentinel").unwrap();
        assert!(!store.replace_face_data("E1", "not-the-face", "new").unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"sentinel");
    }

    #[test]
    fn test_document_without_counters_reconciles_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.json");
        let doc = serde_json::json!({
            "employees": [contract::employee("E1", "Ada", "R&D")],
            "attendance": [{
                "id": 41,
                "employee_id": "E1",
                "check_in": "2024-03-01T09:00:00",
                "check_out": null,
                "status": "present"
            }]
        });
        std::fs::write(&path, doc.to_string()).unwrap();

        let store = DocumentStore::open(&path).unwrap();
        let record = store
            .insert_attendance("E1", contract::at("2024-03-02", "09:00:00"))
            .unwrap();
        assert_eq!(record.id, 42);
    }

    #[test]
    fn test_failed_mutation_leaves_document_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(&dir.path().join("attendance.json")).unwrap();
        store
            .insert_employee(&contract::employee("E1", "Ada", "R&D"))
            .unwrap();
        assert!(store
            .insert_employee(&contract::employee("E1", "Other", "Ops"))
            .is_err());
        assert_eq!(store.list_employees().unwrap().len(), 1);
    }
}
