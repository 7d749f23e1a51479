//! Background write-back of normalized face payloads.
//!
//! Recognition reads every stored payload; rows whose cached signature or
//! hash had to be recomputed are queued here and rewritten on a dedicated
//! thread, so the match decision never waits on (or fails because of) a write.

use rollcall_core::FacePayload;
use rollcall_store::Store;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;

use crate::ServiceError;

/// One payload rewrite.
struct BackfillJob {
    employee_id: String,
    /// Payload as read during recognition; the write is skipped if it changed.
    expected: String,
    face_data: String,
}

/// Handle to the backfill worker thread.
///
/// Dropping the handle closes the queue and waits for pending writes.
pub struct Backfill {
    tx: Option<mpsc::UnboundedSender<BackfillJob>>,
    worker: Option<JoinHandle<()>>,
}

impl Backfill {
    /// Spawn the worker on a dedicated OS thread.
    pub fn spawn(store: Arc<dyn Store>) -> Result<Self, ServiceError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<BackfillJob>();

        let worker = std::thread::Builder::new()
            .name("rollcall-backfill".into())
            .spawn(move || {
                tracing::debug!("backfill worker started");
                while let Some(job) = rx.blocking_recv() {
                    match store.replace_face_data(&job.employee_id, &job.expected, &job.face_data) {
                        Ok(true) => {
                            tracing::debug!(employee_id = %job.employee_id, "face payload backfilled")
                        }
                        Ok(false) => tracing::debug!(
                            employee_id = %job.employee_id,
                            "face payload changed since read; backfill skipped"
                        ),
                        Err(e) => tracing::warn!(
                            employee_id = %job.employee_id,
                            error = %e,
                            "face payload backfill failed"
                        ),
                    }
                }
                tracing::debug!("backfill worker exiting");
            })
            .map_err(ServiceError::Worker)?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Queue a rewrite of `employee_id`'s stored payload from `expected`
    /// (the value read) to the normalized `payload`.
    pub fn queue(&self, employee_id: &str, expected: &str, payload: &FacePayload) {
        let face_data = match payload.to_storage() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(employee_id, error = %e, "cannot serialize payload for backfill");
                return;
            }
        };
        let Some(tx) = &self.tx else {
            return;
        };
        if tx
            .send(BackfillJob {
                employee_id: employee_id.to_string(),
                expected: expected.to_string(),
                face_data,
            })
            .is_err()
        {
            tracing::warn!(employee_id, "backfill worker gone; write-back dropped");
        }
    }

    /// Close the queue and wait until every queued write has been attempted.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("backfill worker panicked");
            }
        }
    }
}

impl Drop for Backfill {
    fn drop(&mut self) {
        self.stop();
    }
}
