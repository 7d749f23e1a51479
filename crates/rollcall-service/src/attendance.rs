use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rollcall_core::{AttendanceEntry, AttendanceRecord, Employee};
use rollcall_store::StoreError;

use crate::activity::Action;
use crate::{Service, ServiceError};

impl Service {
    pub fn has_attendance_on_date(
        &self,
        employee_id: &str,
        date: NaiveDate,
    ) -> Result<bool, ServiceError> {
        Ok(self.store.has_attendance_on(employee_id, date)?)
    }

    /// Mark an employee present, at `at` or now.
    pub fn mark_attendance(
        &self,
        employee_id: &str,
        at: Option<NaiveDateTime>,
    ) -> Result<AttendanceRecord, ServiceError> {
        let employee = self.get_employee(employee_id)?;
        let record = self.check_in(&employee, at.unwrap_or_else(Self::now))?;
        self.log_activity(
            Action::AttendanceManual,
            format!(
                "Attendance marked for {} ({}) at {}",
                employee.full_name,
                employee.employee_id,
                record.check_in.format("%Y-%m-%d %H:%M")
            ),
        );
        Ok(record)
    }

    /// Mark attendance on a chosen date, from `YYYY-MM-DD` and `HH:MM` input.
    pub fn mark_manual(
        &self,
        employee_id: &str,
        date: &str,
        time: &str,
    ) -> Result<AttendanceRecord, ServiceError> {
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| ServiceError::Validation(format!("Invalid date: {date}")))?;
        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
            .map_err(|_| ServiceError::Validation(format!("Invalid time: {time}")))?;
        self.mark_attendance(employee_id, Some(date.and_time(time)))
    }

    /// Insert one check-in, mapping store conflicts to service errors.
    pub(crate) fn check_in(
        &self,
        employee: &Employee,
        at: NaiveDateTime,
    ) -> Result<AttendanceRecord, ServiceError> {
        match self.store.insert_attendance(&employee.employee_id, at) {
            Ok(record) => {
                tracing::info!(
                    employee_id = %employee.employee_id,
                    record_id = record.id,
                    check_in = %record.check_in,
                    "attendance marked"
                );
                Ok(record)
            }
            Err(StoreError::Duplicate { .. }) => Err(ServiceError::AlreadyMarked {
                employee_id: employee.employee_id.clone(),
                date: at.date(),
            }),
            Err(StoreError::MissingReference { .. }) => {
                Err(ServiceError::not_found("employee", &employee.employee_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Hard-delete an attendance record, returning what was removed.
    pub fn delete_attendance_record(&self, id: i64) -> Result<AttendanceRecord, ServiceError> {
        let record = self
            .store
            .get_attendance(id)?
            .ok_or_else(|| ServiceError::not_found("attendance record", id))?;
        if !self.store.delete_attendance(id)? {
            return Err(ServiceError::not_found("attendance record", id));
        }

        tracing::info!(record_id = id, employee_id = %record.employee_id, "attendance deleted");
        self.log_activity(
            Action::AttendanceDelete,
            format!(
                "Deleted attendance record {id} for {} on {}",
                record.employee_id,
                record.date()
            ),
        );
        Ok(record)
    }

    /// Today's check-ins, newest first.
    pub fn todays_attendance(&self) -> Result<Vec<AttendanceEntry>, ServiceError> {
        let today = Self::today();
        self.attendance_between(today, today)
    }

    /// Check-ins dated within `start..=end` (either order), newest first.
    pub fn attendance_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, ServiceError> {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Ok(self.store.attendance_between(start, end)?)
    }
}
