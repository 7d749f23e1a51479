//! rollcall-core: Face payload codec and heuristic face matcher.
//!
//! Turns captured images into stored payloads (raw capture, 16×16 grayscale
//! signature, SHA-256 content hash) and matches a fresh capture against the
//! enrolled employees. Also holds the attendance data model shared by the
//! storage backends and the services.

pub mod matcher;
pub mod payload;
pub mod similarity;
pub mod types;

pub use matcher::{Candidate, HeuristicMatcher, MatchResult, Matcher, Strategy, Thresholds};
pub use payload::{FacePayload, ParsedPayload, PayloadError, Signature};
pub use types::{
    ActivityLogEntry, AdminUser, AttendanceEntry, AttendanceRecord, Employee, EmployeeUpdate,
    NewActivity, STATUS_PRESENT,
};
