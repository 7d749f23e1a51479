use chrono::NaiveDate;
use rollcall_core::PayloadError;
use rollcall_store::StoreError;
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("capture could not be decoded")]
    Decode,
    #[error("employee id already registered: {0}")]
    DuplicateId(String),
    #[error("attendance already marked for {employee_id} on {date}")]
    AlreadyMarked {
        employee_id: String,
        date: NaiveDate,
    },
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("no matching face")]
    NoMatch,
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("credential error: {0}")]
    Auth(AuthError),
    #[error("storage error: {0}")]
    Persistence(#[from] StoreError),
    #[error("failed to start backfill worker: {0}")]
    Worker(#[source] std::io::Error),
}

impl ServiceError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        ServiceError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Message suitable for showing to an operator or employee.
    ///
    /// Internal failures are reported generically; their detail belongs in
    /// the log, see [`is_internal`](Self::is_internal).
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Decode => {
                "The captured image could not be read. Please capture again.".to_string()
            }
            ServiceError::DuplicateId(id) => format!("Employee ID {id} is already registered."),
            ServiceError::AlreadyMarked { employee_id, date } => {
                format!("Attendance already marked for {employee_id} on {date}.")
            }
            ServiceError::NotFound { entity, key } => {
                let mut entity = entity.to_string();
                if let Some(first) = entity.get_mut(..1) {
                    first.make_ascii_uppercase();
                }
                format!("{entity} {key} was not found.")
            }
            ServiceError::NoMatch => {
                "Face not recognized. Please try again or contact an administrator.".to_string()
            }
            ServiceError::Validation(msg) => msg.clone(),
            ServiceError::InvalidCredentials => "Invalid username or password.".to_string(),
            ServiceError::Auth(_) | ServiceError::Persistence(_) | ServiceError::Worker(_) => {
                "An internal error occurred. Please try again later.".to_string()
            }
        }
    }

    /// Failures of the system itself rather than of the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ServiceError::Auth(_) | ServiceError::Persistence(_) | ServiceError::Worker(_)
        )
    }
}

impl From<PayloadError> for ServiceError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::Decode => ServiceError::Decode,
            PayloadError::Serialize(e) => ServiceError::Persistence(StoreError::Json(e)),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ServiceError::InvalidCredentials,
            other => ServiceError::Auth(other),
        }
    }
}
