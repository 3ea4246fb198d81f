//! Storage abstraction layer for the hospital API.
//!
//! This crate defines the record types (patients, visits, prescriptions,
//! reports, users), their validation rules, the [`StorageError`] taxonomy and
//! the [`HospitalStorage`] trait that every backend implements.
//!
//! Backends live in their own crates:
//!
//! - `hospital-db-memory`: in-memory tables for tests and local development
//! - `hospital-db-postgres`: PostgreSQL via sqlx
//!
//! # Example
//!
//! ```ignore
//! use hospital_storage::{HospitalStorage, StorageError, Patient};
//!
//! async fn load(storage: &dyn HospitalStorage, id: i64) -> Result<Patient, StorageError> {
//!     storage
//!         .get_patient(id)
//!         .await?
//!         .ok_or_else(|| StorageError::not_found("patient", id))
//! }
//! ```

pub mod error;
pub mod traits;
pub mod types;
pub mod validation;

pub use error::StorageError;
pub use traits::HospitalStorage;
pub use types::{
    NewPatient, NewPrescription, NewReport, NewUser, NewVisit, Patient, PatientFilter,
    PatientRemoval, PatientUpdate, Prescription, PrescriptionFilter, PrescriptionUpdate, Report,
    ReportFilter, ReportUpdate, Role, User, Visit, VisitFilter, VisitRemoval, VisitUpdate,
};
pub use validation::{FIELD_RULES, FieldError, FieldRule, Validate, ValidationErrors};

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Shared, dynamically dispatched storage handle.
pub type DynStorage = std::sync::Arc<dyn HospitalStorage>;
