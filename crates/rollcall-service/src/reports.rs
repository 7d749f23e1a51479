//! Attendance statistics and summaries.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::{Service, ServiceError};

/// Presence within one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowStats {
    /// Distinct employees with at least one check-in.
    pub present: u64,
    /// `present / total_employees` as a percentage, one decimal.
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total_employees: u64,
    pub today: WindowStats,
    pub week: WindowStats,
    pub month: WindowStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentAttendance {
    pub department: String,
    pub total_employees: u64,
    pub present: u64,
}

/// One employee's attendance over a date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeReport {
    pub employee_id: String,
    pub full_name: String,
    pub department: String,
    pub position: String,
    pub days_present: u64,
    pub total_check_ins: u64,
    pub first_check_in: Option<NaiveDateTime>,
    pub last_check_in: Option<NaiveDateTime>,
}

fn rate(present: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (present as f64 / total as f64 * 1000.0).round() / 10.0
}

/// First day of the week containing `date`.
pub fn week_start(date: NaiveDate, first_day: Weekday) -> NaiveDate {
    let offset = (7 + date.weekday().num_days_from_monday() - first_day.num_days_from_monday()) % 7;
    date - Duration::days(i64::from(offset))
}

impl Service {
    /// Presence counts for today, this week and this month.
    pub fn stats(&self) -> Result<Stats, ServiceError> {
        self.stats_on(Self::today())
    }

    /// Presence counts for the day, week and month containing `today`.
    pub fn stats_on(&self, today: NaiveDate) -> Result<Stats, ServiceError> {
        let total = self.store.count_employees()?;
        let week_from = week_start(today, self.week_start);
        let month_from = today.with_day(1).unwrap_or(today);

        let entries = self
            .store
            .attendance_between(week_from.min(month_from), today)?;
        let distinct_since = |from: NaiveDate| {
            entries
                .iter()
                .filter(|e| e.record.date() >= from)
                .map(|e| e.record.employee_id.as_str())
                .collect::<HashSet<_>>()
                .len() as u64
        };

        let window = |present: u64| WindowStats {
            present,
            rate: rate(present, total),
        };
        Ok(Stats {
            total_employees: total,
            today: window(distinct_since(today)),
            week: window(distinct_since(week_from)),
            month: window(distinct_since(month_from)),
        })
    }

    /// Per department: employee count and how many were present on `date`.
    pub fn department_attendance(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<DepartmentAttendance>, ServiceError> {
        let present: HashSet<String> = self
            .store
            .attendance_between(date, date)?
            .into_iter()
            .map(|e| e.record.employee_id)
            .collect();

        let mut departments: BTreeMap<String, DepartmentAttendance> = BTreeMap::new();
        for employee in self.store.list_employees()? {
            let row = departments
                .entry(employee.department.clone())
                .or_insert_with(|| DepartmentAttendance {
                    department: employee.department.clone(),
                    total_employees: 0,
                    present: 0,
                });
            row.total_employees += 1;
            if present.contains(&employee.employee_id) {
                row.present += 1;
            }
        }
        Ok(departments.into_values().collect())
    }

    /// Per employee attendance summary over `start..=end`, ordered by
    /// department then name. Employees without check-ins are included.
    pub fn attendance_report(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<EmployeeReport>, ServiceError> {
        let entries = self.attendance_between(start, end)?;

        let mut reports: Vec<EmployeeReport> = self
            .store
            .list_employees()?
            .into_iter()
            .map(|e| EmployeeReport {
                employee_id: e.employee_id,
                full_name: e.full_name,
                department: e.department,
                position: e.position,
                days_present: 0,
                total_check_ins: 0,
                first_check_in: None,
                last_check_in: None,
            })
            .collect();

        for report in &mut reports {
            let mine: Vec<_> = entries
                .iter()
                .filter(|e| e.record.employee_id == report.employee_id)
                .map(|e| e.record.check_in)
                .collect();
            report.total_check_ins = mine.len() as u64;
            report.days_present = mine
                .iter()
                .map(NaiveDateTime::date)
                .collect::<HashSet<_>>()
                .len() as u64;
            report.first_check_in = mine.iter().min().copied();
            report.last_check_in = mine.iter().max().copied();
        }

        reports.sort_by(|a, b| {
            a.department
                .cmp(&b.department)
                .then_with(|| a.full_name.cmp(&b.full_name))
                .then_with(|| a.employee_id.cmp(&b.employee_id))
        });
        Ok(reports)
    }
}
