//! CSV attendance export.
//!
//! One row per employee (ordered by name) and one column per calendar day
//! starting at the range start, capped at the configured day count. Each
//! cell holds the check-in time or is left blank.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashMap;

use crate::activity::Action;
use crate::{Service, ServiceError};

/// A rendered export.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceExport {
    /// Suggested download name, `attendance_export_<start>_to_<end>.csv`.
    pub file_name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub csv: String,
}

/// Quote a CSV field if it contains a delimiter, quote or line break.
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_row<I, S>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let row: Vec<String> = fields
        .into_iter()
        .map(|f| csv_escape(f.as_ref()))
        .collect();
    out.push_str(&row.join(","));
    out.push('\n');
}

#[derive(Default)]
struct EmployeeDays {
    /// First check-in time seen per day column.
    cells: HashMap<usize, NaiveDateTime>,
    last_check_in: Option<NaiveDateTime>,
}

impl Service {
    /// Render attendance in `start..=end` as CSV. Reversed bounds are swapped.
    pub fn export_csv(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AttendanceExport, ServiceError> {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let span = (end - start).num_days() + 1;
        let columns = span.min(i64::from(self.export_max_days));
        let days: Vec<NaiveDate> = (0..columns).map(|i| start + Duration::days(i)).collect();
        let last_day = days.last().copied().unwrap_or(start);

        let mut by_employee: HashMap<String, EmployeeDays> = HashMap::new();
        for entry in self.store.attendance_between(start, last_day)? {
            let check_in = entry.record.check_in;
            let Ok(col) = usize::try_from((check_in.date() - start).num_days()) else {
                continue;
            };
            let row = by_employee.entry(entry.record.employee_id).or_default();
            row.cells
                .entry(col)
                .and_modify(|t| *t = (*t).min(check_in))
                .or_insert(check_in);
            if row.last_check_in.map_or(true, |last| check_in > last) {
                row.last_check_in = Some(check_in);
            }
        }

        let mut csv = String::new();
        push_row(
            &mut csv,
            std::iter::once("Employee Name".to_string())
                .chain(days.iter().map(|d| d.format("%Y-%m-%d").to_string()))
                .chain(["Last Check-in".to_string(), "Total Days Present".to_string()]),
        );

        let employees = self.store.list_employees()?;
        for employee in &employees {
            let row = by_employee.get(&employee.employee_id);
            let mut fields = vec![employee.full_name.clone()];
            for col in 0..days.len() {
                fields.push(
                    row.and_then(|r| r.cells.get(&col))
                        .map(|t| t.format("%H:%M").to_string())
                        .unwrap_or_default(),
                );
            }
            fields.push(
                row.and_then(|r| r.last_check_in)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default(),
            );
            fields.push(row.map_or(0, |r| r.cells.len()).to_string());
            push_row(&mut csv, fields);
        }

        tracing::info!(
            %start,
            %end,
            columns = days.len(),
            employees = employees.len(),
            "attendance exported"
        );
        self.log_activity(
            Action::ExportAttendance,
            format!("Exported attendance from {start} to {end}"),
        );

        Ok(AttendanceExport {
            file_name: format!("attendance_export_{start}_to_{end}.csv"),
            start,
            end,
            csv,
        })
    }
}
