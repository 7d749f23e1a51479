//! rollcall-service: Attendance, employee, recognition and admin services.
//!
//! [`Service`] is the single entry point used by front ends. It owns the
//! configured [`Store`], the face matcher and the backfill worker; the
//! operations themselves live in one module per concern.

pub mod activity;
pub mod attendance;
pub mod auth;
pub mod backfill;
pub mod config;
pub mod employees;
pub mod error;
pub mod export;
pub mod recognition;
pub mod reports;

pub use activity::Action;
pub use auth::AuthError;
pub use config::{Config, ConfigError};
pub use employees::{EmployeeFields, NewEmployee};
pub use error::ServiceError;
pub use export::AttendanceExport;
pub use recognition::{CheckIn, Recognized};
pub use reports::{DepartmentAttendance, EmployeeReport, Stats, WindowStats};

use backfill::Backfill;
use chrono::{Local, NaiveDate, NaiveDateTime, Weekday};
use rollcall_core::HeuristicMatcher;
use rollcall_store::Store;
use std::sync::Arc;

pub struct Service {
    store: Arc<dyn Store>,
    matcher: HeuristicMatcher,
    week_start: Weekday,
    export_max_days: u32,
    /// Recorded on activity log entries.
    requester: Option<String>,
    backfill: Backfill,
}

impl Service {
    /// Build the service over an already opened store.
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Result<Self, ServiceError> {
        let backfill = Backfill::spawn(store.clone())?;
        Ok(Self {
            store,
            matcher: HeuristicMatcher::new(config.thresholds),
            week_start: config.week_start,
            export_max_days: config.export_max_days,
            requester: None,
            backfill,
        })
    }

    /// Open the configured store and build the service over it.
    pub fn open(config: &Config) -> Result<Self, ServiceError> {
        let store = rollcall_store::open(config.backend, &config.db_path())?;
        Self::new(store, config)
    }

    /// Name recorded as the requester of subsequent activity log entries.
    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }

    /// Wait for queued background writes, then release the store.
    pub fn shutdown(self) {
        self.backfill.shutdown();
    }

    fn now() -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn today() -> NaiveDate {
        Self::now().date()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use image::{ImageFormat, Rgb, RgbImage};
    use rollcall_core::Employee;
    use rollcall_store::SqliteStore;
    use std::io::Cursor;

    /// Service over a fresh in-memory store, plus the store itself.
    pub(crate) fn service() -> (Service, Arc<dyn Store>) {
        service_with(&Config::default())
    }

    pub(crate) fn service_with(config: &Config) -> (Service, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let svc = Service::new(store.clone(), config).unwrap();
        (svc, store)
    }

    pub(crate) fn encode_image(img: &RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    /// 32x32 image with a gradient so different seeds give distinct signatures.
    pub(crate) fn face_image(seed: [u8; 3]) -> RgbImage {
        RgbImage::from_fn(32, 32, |x, y| {
            let shade = (x + y) as u8;
            Rgb([
                seed[0].saturating_add(shade),
                seed[1].saturating_add(shade / 2),
                seed[2],
            ])
        })
    }

    pub(crate) fn data_url(bytes: &[u8]) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    pub(crate) fn png_capture(seed: [u8; 3]) -> String {
        data_url(&encode_image(&face_image(seed), ImageFormat::Png))
    }

    pub(crate) fn employee_with_face(id: &str, name: &str, face_data: Option<String>) -> Employee {
        Employee {
            employee_id: id.into(),
            full_name: name.into(),
            department: "Engineering".into(),
            position: "Engineer".into(),
            face_data,
            registration_date: Service::now(),
        }
    }

    pub(crate) fn new_employee(id: &str, name: &str, department: &str, capture: String) -> NewEmployee {
        NewEmployee {
            employee_id: id.into(),
            full_name: name.into(),
            department: department.into(),
            position: "Engineer".into(),
            capture,
        }
    }

    pub(crate) fn day(date: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap()
    }

    pub(crate) fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M").unwrap()
    }
}
