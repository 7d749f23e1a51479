use rollcall_core::{Employee, EmployeeUpdate, FacePayload};
use rollcall_store::StoreError;

use crate::activity::Action;
use crate::{Service, ServiceError};

/// Registration form.
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub employee_id: String,
    pub full_name: String,
    pub department: String,
    pub position: String,
    /// Data-URL (or bare base64) encoded face capture.
    pub capture: String,
}

/// Fields an admin edit replaces.
#[derive(Debug, Clone)]
pub struct EmployeeFields {
    pub full_name: String,
    pub department: String,
    pub position: String,
}

fn required(value: &str, label: &str) -> Result<String, ServiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::Validation(format!("{label} is required.")));
    }
    Ok(value.to_string())
}

impl EmployeeFields {
    fn validated(&self) -> Result<Self, ServiceError> {
        Ok(Self {
            full_name: required(&self.full_name, "Full name")?,
            department: required(&self.department, "Department")?,
            position: required(&self.position, "Position")?,
        })
    }
}

impl Service {
    /// Register a new employee with their face capture.
    pub fn register(&self, form: NewEmployee) -> Result<Employee, ServiceError> {
        let employee_id = required(&form.employee_id, "Employee ID")?;
        let fields = EmployeeFields {
            full_name: form.full_name,
            department: form.department,
            position: form.position,
        }
        .validated()?;
        let capture = form.capture.trim();
        if capture.is_empty() {
            return Err(ServiceError::Validation("Face capture is required.".into()));
        }

        let payload = FacePayload::encode(capture)?;
        let employee = Employee {
            employee_id,
            full_name: fields.full_name,
            department: fields.department,
            position: fields.position,
            face_data: Some(payload.to_storage()?),
            registration_date: Self::now(),
        };

        match self.store.insert_employee(&employee) {
            Ok(()) => {}
            Err(StoreError::Duplicate { key, .. }) => return Err(ServiceError::DuplicateId(key)),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            employee_id = %employee.employee_id,
            has_signature = payload.signature.is_some(),
            "employee registered"
        );
        self.log_activity(
            Action::EmployeeRegister,
            format!(
                "Registered employee {} ({})",
                employee.full_name, employee.employee_id
            ),
        );
        Ok(employee)
    }

    /// Apply an admin edit. A new capture replaces the stored face only if
    /// it encodes; otherwise nothing is changed.
    pub fn update_employee(
        &self,
        employee_id: &str,
        fields: &EmployeeFields,
        capture: Option<&str>,
    ) -> Result<Employee, ServiceError> {
        let fields = fields.validated()?;
        if self.store.get_employee(employee_id)?.is_none() {
            return Err(ServiceError::not_found("employee", employee_id));
        }

        let face_data = match capture.map(str::trim).filter(|c| !c.is_empty()) {
            Some(capture) => Some(FacePayload::encode(capture)?.to_storage()?),
            None => None,
        };
        let replaced_face = face_data.is_some();

        let update = EmployeeUpdate {
            full_name: fields.full_name,
            department: fields.department,
            position: fields.position,
            face_data,
        };
        if !self.store.update_employee(employee_id, &update)? {
            return Err(ServiceError::not_found("employee", employee_id));
        }

        tracing::info!(employee_id, replaced_face, "employee updated");
        self.log_activity(
            Action::EmployeeUpdate,
            format!("Updated employee {} ({employee_id})", update.full_name),
        );
        self.get_employee(employee_id)
    }

    /// Delete an employee and their attendance history.
    ///
    /// Returns the number of attendance records removed with them.
    pub fn delete_employee(&self, employee_id: &str) -> Result<usize, ServiceError> {
        let employee = self.get_employee(employee_id)?;
        let removed = self
            .store
            .delete_employee(employee_id)?
            .ok_or_else(|| ServiceError::not_found("employee", employee_id))?;

        tracing::info!(employee_id, removed_records = removed, "employee deleted");
        self.log_activity(
            Action::EmployeeDelete,
            format!(
                "Deleted employee {} ({employee_id}) and {removed} attendance records",
                employee.full_name
            ),
        );
        Ok(removed)
    }

    pub fn get_employee(&self, employee_id: &str) -> Result<Employee, ServiceError> {
        self.store
            .get_employee(employee_id)?
            .ok_or_else(|| ServiceError::not_found("employee", employee_id))
    }

    /// All employees ordered by name.
    pub fn list_employees(&self) -> Result<Vec<Employee>, ServiceError> {
        Ok(self.store.list_employees()?)
    }

    /// The stored capture string, whichever payload form the row holds.
    pub fn face_image(&self, employee_id: &str) -> Result<String, ServiceError> {
        let employee = self.get_employee(employee_id)?;
        let stored = employee
            .face_data
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ServiceError::not_found("face image", employee_id))?;
        Ok(FacePayload::parse(&stored).payload.image)
    }
}
