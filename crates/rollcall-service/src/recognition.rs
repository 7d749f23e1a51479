use rollcall_core::{AttendanceRecord, Candidate, FacePayload, Matcher, Strategy};
use serde::Serialize;

use crate::activity::Action;
use crate::{Service, ServiceError};

/// An accepted face match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recognized {
    pub employee_id: String,
    pub full_name: String,
    pub score: f64,
    pub strategy: Strategy,
}

/// A recognized capture and the attendance it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckIn {
    pub recognized: Recognized,
    pub record: AttendanceRecord,
}

impl Service {
    /// Identify the employee in `capture`.
    ///
    /// Every enrolled payload is compared; stored payloads whose cached
    /// fields had to be recomputed are queued for write-back.
    pub fn recognize(&self, capture: &str) -> Result<Recognized, ServiceError> {
        let probe = FacePayload::encode(capture)?;

        let mut gallery = Vec::new();
        for employee in self.store.list_employees()? {
            let Some(stored) = employee.face_data.as_deref().filter(|d| !d.is_empty()) else {
                continue;
            };
            let parsed = FacePayload::parse(stored);
            if parsed.should_backfill() {
                self.backfill
                    .queue(&employee.employee_id, stored, &parsed.payload);
            }
            gallery.push(Candidate {
                employee_id: employee.employee_id,
                full_name: employee.full_name,
                payload: parsed.payload,
            });
        }

        let result = self.matcher.compare(&probe, &gallery);
        match (
            result.matched,
            result.employee_id,
            result.full_name,
            result.strategy,
            result.score,
        ) {
            (true, Some(employee_id), Some(full_name), Some(strategy), Some(score)) => {
                tracing::info!(%employee_id, %strategy, score, "face recognized");
                Ok(Recognized {
                    employee_id,
                    full_name,
                    score,
                    strategy,
                })
            }
            (_, _, _, strategy, score) => {
                tracing::info!(
                    candidates = gallery.len(),
                    best_score = ?score,
                    strategy = ?strategy,
                    "face not recognized"
                );
                Err(ServiceError::NoMatch)
            }
        }
    }

    /// Recognize `capture` and mark today's attendance for the match.
    pub fn recognize_and_mark(&self, capture: &str) -> Result<CheckIn, ServiceError> {
        let recognized = self.recognize(capture)?;
        let employee = self.get_employee(&recognized.employee_id)?;
        let record = self.check_in(&employee, Self::now())?;
        self.log_activity(
            Action::AttendanceMarked,
            format!(
                "Attendance marked for {} ({}) by face recognition ({} score {:.2})",
                employee.full_name, employee.employee_id, recognized.strategy, recognized.score
            ),
        );
        Ok(CheckIn { recognized, record })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        data_url, employee_with_face, encode_image, face_image, new_employee, png_capture,
        service, service_with,
    };
    use crate::{Config, EmployeeFields};
    use image::ImageFormat;

    #[test]
    fn test_empty_gallery_is_no_match() {
        let (svc, _store) = service();
        assert!(matches!(
            svc.recognize(&png_capture([1, 2, 3])),
            Err(ServiceError::NoMatch)
        ));
    }

    #[test]
    fn test_undecodable_capture_is_decode_error() {
        let (svc, _store) = service();
        svc.register(new_employee("E1", "Ada", "R&D", png_capture([1, 2, 3])))
            .unwrap();
        assert!(matches!(svc.recognize(""), Err(ServiceError::Decode)));
        assert!(matches!(
            svc.recognize("data:image/png;base64,"),
            Err(ServiceError::Decode)
        ));
    }

    #[test]
    fn test_identical_capture_scores_zero() {
        let (svc, _store) = service();
        let capture = png_capture([40, 80, 120]);
        svc.register(new_employee("E1", "Ada", "R&D", capture.clone()))
            .unwrap();
        svc.register(new_employee("E2", "Bob", "Ops", png_capture([190, 190, 190])))
            .unwrap();

        let recognized = svc.recognize(&capture).unwrap();
        assert_eq!(recognized.employee_id, "E1");
        assert_eq!(recognized.full_name, "Ada");
        assert_eq!(recognized.score, 0.0);
    }

    #[test]
    fn test_reencoded_bitmap_matches_by_signature() {
        let (svc, _store) = service();
        let img = face_image([60, 60, 60]);
        svc.register(new_employee(
            "E1",
            "Ada",
            "R&D",
            data_url(&encode_image(&img, ImageFormat::Png)),
        ))
        .unwrap();

        let bmp = data_url(&encode_image(&img, ImageFormat::Bmp));
        let recognized = svc.recognize(&bmp).unwrap();
        assert_eq!(recognized.employee_id, "E1");
        assert_eq!(recognized.strategy, Strategy::Signature);
        assert_eq!(recognized.score, 0.0);
    }

    #[test]
    fn test_non_bitmap_capture_matches_by_hash() {
        let (svc, _store) = service();
        let capture = data_url(b"opaque capture bytes that are not an image");
        svc.register(new_employee("E1", "Ada", "R&D", capture.clone()))
            .unwrap();
        let recognized = svc.recognize(&capture).unwrap();
        assert_eq!(recognized.strategy, Strategy::Hash);
        assert_eq!(recognized.score, 0.0);
    }

    #[test]
    fn test_distant_face_rejected() {
        let (svc, _store) = service();
        svc.register(new_employee("E1", "Ada", "R&D", png_capture([0, 0, 0])))
            .unwrap();
        assert!(matches!(
            svc.recognize(&png_capture([190, 190, 190])),
            Err(ServiceError::NoMatch)
        ));
    }

    #[test]
    fn test_thresholds_come_from_config() {
        let mut config = Config::default();
        config.thresholds.signature_max_distance = 200.0;
        let (svc, _store) = service_with(&config);
        svc.register(new_employee("E1", "Ada", "R&D", png_capture([0, 0, 0])))
            .unwrap();
        let recognized = svc.recognize(&png_capture([190, 190, 190])).unwrap();
        assert_eq!(recognized.employee_id, "E1");
        assert!(recognized.score > 60.0);
    }

    #[test]
    fn test_legacy_rows_are_backfilled() {
        let (svc, store) = service();
        let legacy = png_capture([30, 30, 30]);
        store
            .insert_employee(&employee_with_face("L1", "Legacy", Some(legacy.clone())))
            .unwrap();

        let recognized = svc.recognize(&legacy).unwrap();
        assert_eq!(recognized.employee_id, "L1");
        svc.shutdown();

        let stored = store.get_employee("L1").unwrap().unwrap().face_data.unwrap();
        let parsed = FacePayload::parse(&stored);
        assert!(!parsed.needs_update, "row should now hold the full payload");
        assert_eq!(parsed.payload.image, legacy);
    }

    #[test]
    fn test_backfill_keeps_face_replaced_after_recognition() {
        let (svc, store) = service();
        let legacy = png_capture([30, 30, 30]);
        store
            .insert_employee(&employee_with_face("E1", "Ada", Some(legacy.clone())))
            .unwrap();

        svc.recognize(&legacy).unwrap();
        let new_face = png_capture([200, 120, 40]);
        let fields = EmployeeFields {
            full_name: "Ada".into(),
            department: "Engineering".into(),
            position: "Engineer".into(),
        };
        svc.update_employee("E1", &fields, Some(&new_face)).unwrap();
        svc.shutdown();

        let stored = store.get_employee("E1").unwrap().unwrap().face_data.unwrap();
        assert_eq!(FacePayload::parse(&stored).payload.image, new_face);
    }

    #[test]
    fn test_recognize_and_mark() {
        let (svc, store) = service();
        let capture = png_capture([40, 80, 120]);
        svc.register(new_employee("E1", "Ada", "R&D", capture.clone()))
            .unwrap();

        let check_in = svc.recognize_and_mark(&capture).unwrap();
        assert_eq!(check_in.recognized.employee_id, "E1");
        assert_eq!(check_in.record.employee_id, "E1");
        assert_eq!(store.recent_activity(1).unwrap()[0].action, "ATTENDANCE_MARKED");

        assert!(matches!(
            svc.recognize_and_mark(&capture),
            Err(ServiceError::AlreadyMarked { .. })
        ));
    }
}
