//! Storage traits for the hospital storage abstraction layer.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{
    NewPatient, NewPrescription, NewReport, NewUser, NewVisit, Patient, PatientFilter,
    PatientRemoval, PatientUpdate, Prescription, PrescriptionFilter, PrescriptionUpdate, Report,
    ReportFilter, ReportUpdate, User, Visit, VisitFilter, VisitRemoval, VisitUpdate,
};

/// The storage trait every hospital backend implements.
///
/// Reads return `Ok(None)` for missing records; errors are reserved for
/// infrastructure failures. Writes validate foreign keys and return
/// `StorageError::InvalidReference` when a referenced record is missing.
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait HospitalStorage: Send + Sync {
    // ==================== Users ====================

    /// Creates a login account.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the username is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, StorageError>;

    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;

    async fn list_users(&self) -> Result<Vec<User>, StorageError>;

    // ==================== Patients ====================

    async fn create_patient(&self, patient: NewPatient) -> Result<Patient, StorageError>;

    async fn get_patient(&self, id: i64) -> Result<Option<Patient>, StorageError>;

    /// Lists patients ordered by id.
    async fn list_patients(&self, filter: PatientFilter) -> Result<Vec<Patient>, StorageError>;

    /// Applies a partial update and bumps `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the patient does not exist.
    async fn update_patient(&self, id: i64, update: PatientUpdate)
    -> Result<Patient, StorageError>;

    /// Deletes a patient together with its visits, prescriptions and reports.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the patient does not exist.
    async fn delete_patient(&self, id: i64) -> Result<PatientRemoval, StorageError>;

    // ==================== Visits ====================

    /// Creates a visit. `doctor_id` must be set by the caller.
    async fn create_visit(&self, visit: NewVisit) -> Result<Visit, StorageError>;

    async fn get_visit(&self, id: i64) -> Result<Option<Visit>, StorageError>;

    async fn list_visits(&self, filter: VisitFilter) -> Result<Vec<Visit>, StorageError>;

    async fn update_visit(&self, id: i64, update: VisitUpdate) -> Result<Visit, StorageError>;

    /// Deletes a visit and detaches its prescriptions.
    async fn delete_visit(&self, id: i64) -> Result<VisitRemoval, StorageError>;

    // ==================== Prescriptions ====================

    /// Creates a prescription. `doctor_id` must be set by the caller.
    async fn create_prescription(
        &self,
        prescription: NewPrescription,
    ) -> Result<Prescription, StorageError>;

    async fn get_prescription(&self, id: i64) -> Result<Option<Prescription>, StorageError>;

    async fn list_prescriptions(
        &self,
        filter: PrescriptionFilter,
    ) -> Result<Vec<Prescription>, StorageError>;

    async fn update_prescription(
        &self,
        id: i64,
        update: PrescriptionUpdate,
    ) -> Result<Prescription, StorageError>;

    async fn delete_prescription(&self, id: i64) -> Result<Prescription, StorageError>;

    // ==================== Reports ====================

    async fn create_report(&self, report: NewReport) -> Result<Report, StorageError>;

    async fn get_report(&self, id: i64) -> Result<Option<Report>, StorageError>;

    async fn list_reports(&self, filter: ReportFilter) -> Result<Vec<Report>, StorageError>;

    async fn update_report(&self, id: i64, update: ReportUpdate) -> Result<Report, StorageError>;

    async fn delete_report(&self, id: i64) -> Result<Report, StorageError>;

    // ==================== Health ====================

    /// Cheap liveness check against the backend.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Returns the backend name for diagnostics.
    fn backend_name(&self) -> &'static str;
}
