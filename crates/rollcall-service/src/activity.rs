use rollcall_core::{ActivityLogEntry, NewActivity};
use std::fmt;

use crate::{Service, ServiceError};

/// Fixed tags written to the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    EmployeeRegister,
    EmployeeUpdate,
    EmployeeDelete,
    /// Check-in from a recognized capture.
    AttendanceMarked,
    /// Check-in entered by employee id.
    AttendanceManual,
    AttendanceDelete,
    ExportAttendance,
    AdminLogin,
    AdminReset,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::EmployeeRegister => "EMPLOYEE_REGISTER",
            Action::EmployeeUpdate => "EMPLOYEE_UPDATE",
            Action::EmployeeDelete => "EMPLOYEE_DELETE",
            Action::AttendanceMarked => "ATTENDANCE_MARKED",
            Action::AttendanceManual => "ATTENDANCE_MANUAL",
            Action::AttendanceDelete => "ATTENDANCE_DELETE",
            Action::ExportAttendance => "EXPORT_ATTENDANCE",
            Action::AdminLogin => "ADMIN_LOGIN",
            Action::AdminReset => "ADMIN_RESET",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Service {
    /// Append to the activity log. A failed write is logged and swallowed.
    pub(crate) fn log_activity(&self, action: Action, details: String) {
        let entry = NewActivity {
            action: action.as_str().to_string(),
            details,
            requester: self.requester.clone(),
        };
        if let Err(e) = self.store.append_activity(&entry) {
            tracing::warn!(%action, error = %e, "failed to write activity log entry");
        }
    }

    /// Most recent activity entries, newest first.
    pub fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityLogEntry>, ServiceError> {
        Ok(self.store.recent_activity(limit)?)
    }
}
