use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Status written on every attendance record.
pub const STATUS_PRESENT: &str = "present";

/// A registered employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    /// Externally assigned, unique identifier.
    pub employee_id: String,
    pub full_name: String,
    pub department: String,
    pub position: String,
    /// Stored face capture: a JSON payload, or a raw capture string in older rows.
    pub face_data: Option<String>,
    pub registration_date: NaiveDateTime,
}

/// Fields replaced by an admin edit.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeUpdate {
    pub full_name: String,
    pub department: String,
    pub position: String,
    /// New face payload; `None` keeps the stored one.
    pub face_data: Option<String>,
}

/// One check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub employee_id: String,
    pub check_in: NaiveDateTime,
    pub check_out: Option<NaiveDateTime>,
    pub status: String,
}

impl AttendanceRecord {
    /// Calendar date of the check-in.
    pub fn date(&self) -> NaiveDate {
        self.check_in.date()
    }
}

/// An attendance record joined with the employee it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub full_name: String,
    pub department: String,
    pub position: String,
}

/// Append-only audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: i64,
    /// Fixed action tag, e.g. `ATTENDANCE_MARKED`.
    pub action: String,
    pub details: String,
    /// Who or what triggered the action (admin username, terminal, host).
    pub requester: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Activity entry before the store assigns an id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub action: String,
    pub details: String,
    pub requester: Option<String>,
}

/// Administrator account. `password_hash` is always an Argon2 PHC string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_date_is_check_in_date() {
        let check_in = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        let record = AttendanceRecord {
            id: 1,
            employee_id: "E1".into(),
            check_in,
            check_out: None,
            status: STATUS_PRESENT.into(),
        };
        assert_eq!(record.date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_entry_serializes_flat() {
        let check_in = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let entry = AttendanceEntry {
            record: AttendanceRecord {
                id: 7,
                employee_id: "E1".into(),
                check_in,
                check_out: None,
                status: STATUS_PRESENT.into(),
            },
            full_name: "Ada Lovelace".into(),
            department: "R&D".into(),
            position: "Engineer".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["full_name"], "Ada Lovelace");
    }
}
