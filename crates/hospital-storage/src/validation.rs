//! Payload validation.
//!
//! The limits enforced here are also published through [`FIELD_RULES`], which
//! backs the `/docs/validation-rules` document.

use std::fmt;

use serde::Serialize;

use crate::types::{
    NewPatient, NewPrescription, NewReport, NewUser, NewVisit, PatientUpdate, PrescriptionUpdate,
    ReportUpdate, VisitUpdate,
};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_CONTACT_LEN: usize = 100;
pub const MAX_AGE: i32 = 150;
pub const MAX_DRUG_NAME_LEN: usize = 100;
pub const MAX_DOSAGE_LEN: usize = 50;
pub const MAX_DURATION_DAYS: i32 = 3650;
pub const MAX_REPORT_TYPE_LEN: usize = 50;
pub const MAX_USERNAME_LEN: usize = 80;

/// A single documented field constraint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldRule {
    pub resource: &'static str,
    pub field: &'static str,
    pub required: bool,
    pub rule: &'static str,
}

pub const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        resource: "patient",
        field: "name",
        required: true,
        rule: "string, 1-100 characters",
    },
    FieldRule {
        resource: "patient",
        field: "age",
        required: true,
        rule: "integer, 0-150",
    },
    FieldRule {
        resource: "patient",
        field: "contact_info",
        required: true,
        rule: "string, 1-100 characters",
    },
    FieldRule {
        resource: "visit",
        field: "patient_id",
        required: true,
        rule: "id of an existing patient",
    },
    FieldRule {
        resource: "visit",
        field: "doctor_id",
        required: false,
        rule: "id of an existing user, defaults to the caller",
    },
    FieldRule {
        resource: "visit",
        field: "visit_date",
        required: false,
        rule: "RFC 3339 timestamp, defaults to now",
    },
    FieldRule {
        resource: "visit",
        field: "diagnosis",
        required: false,
        rule: "free text",
    },
    FieldRule {
        resource: "prescription",
        field: "patient_id",
        required: true,
        rule: "id of an existing patient",
    },
    FieldRule {
        resource: "prescription",
        field: "doctor_id",
        required: false,
        rule: "id of an existing user, defaults to the caller",
    },
    FieldRule {
        resource: "prescription",
        field: "visit_id",
        required: false,
        rule: "id of an existing visit of the same patient",
    },
    FieldRule {
        resource: "prescription",
        field: "drug_name",
        required: true,
        rule: "string, 1-100 characters",
    },
    FieldRule {
        resource: "prescription",
        field: "dosage",
        required: true,
        rule: "string, 1-50 characters",
    },
    FieldRule {
        resource: "prescription",
        field: "duration",
        required: true,
        rule: "integer number of days, 1-3650",
    },
    FieldRule {
        resource: "report",
        field: "patient_id",
        required: true,
        rule: "id of an existing patient",
    },
    FieldRule {
        resource: "report",
        field: "report_type",
        required: true,
        rule: "string, 1-50 characters",
    },
    FieldRule {
        resource: "report",
        field: "report_data",
        required: true,
        rule: "non-empty text",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Accumulated field errors for one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
        }
        Ok(())
    }
}

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationErrors>;
}

fn check_text(errors: &mut ValidationErrors, field: &'static str, value: &str, max: usize) {
    let len = value.trim().chars().count();
    if len == 0 {
        errors.push(field, "must not be empty");
    } else if value.chars().count() > max {
        errors.push(field, format!("must be at most {max} characters"));
    }
}

fn check_age(errors: &mut ValidationErrors, age: i32) {
    if !(0..=MAX_AGE).contains(&age) {
        errors.push("age", format!("must be between 0 and {MAX_AGE}"));
    }
}

fn check_duration(errors: &mut ValidationErrors, duration: i32) {
    if !(1..=MAX_DURATION_DAYS).contains(&duration) {
        errors.push(
            "duration",
            format!("must be between 1 and {MAX_DURATION_DAYS} days"),
        );
    }
}

fn check_id(errors: &mut ValidationErrors, field: &'static str, id: i64) {
    if id <= 0 {
        errors.push(field, "must be a positive id");
    }
}

impl Validate for NewUser {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        check_text(&mut errors, "username", &self.username, MAX_USERNAME_LEN);
        if self.password_hash.is_empty() {
            errors.push("password", "must not be empty");
        }
        errors.into_result()
    }
}

impl Validate for NewPatient {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        check_text(&mut errors, "name", &self.name, MAX_NAME_LEN);
        check_age(&mut errors, self.age);
        check_text(&mut errors, "contact_info", &self.contact_info, MAX_CONTACT_LEN);
        errors.into_result()
    }
}

impl Validate for PatientUpdate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if let Some(name) = &self.name {
            check_text(&mut errors, "name", name, MAX_NAME_LEN);
        }
        if let Some(age) = self.age {
            check_age(&mut errors, age);
        }
        if let Some(contact_info) = &self.contact_info {
            check_text(&mut errors, "contact_info", contact_info, MAX_CONTACT_LEN);
        }
        errors.into_result()
    }
}

impl Validate for NewVisit {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        check_id(&mut errors, "patient_id", self.patient_id);
        if let Some(doctor_id) = self.doctor_id {
            check_id(&mut errors, "doctor_id", doctor_id);
        }
        errors.into_result()
    }
}

impl Validate for VisitUpdate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

impl Validate for NewPrescription {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        check_id(&mut errors, "patient_id", self.patient_id);
        if let Some(doctor_id) = self.doctor_id {
            check_id(&mut errors, "doctor_id", doctor_id);
        }
        if let Some(visit_id) = self.visit_id {
            check_id(&mut errors, "visit_id", visit_id);
        }
        check_text(&mut errors, "drug_name", &self.drug_name, MAX_DRUG_NAME_LEN);
        check_text(&mut errors, "dosage", &self.dosage, MAX_DOSAGE_LEN);
        check_duration(&mut errors, self.duration);
        errors.into_result()
    }
}

impl Validate for PrescriptionUpdate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if let Some(drug_name) = &self.drug_name {
            check_text(&mut errors, "drug_name", drug_name, MAX_DRUG_NAME_LEN);
        }
        if let Some(dosage) = &self.dosage {
            check_text(&mut errors, "dosage", dosage, MAX_DOSAGE_LEN);
        }
        if let Some(duration) = self.duration {
            check_duration(&mut errors, duration);
        }
        errors.into_result()
    }
}

impl Validate for NewReport {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        check_id(&mut errors, "patient_id", self.patient_id);
        check_text(&mut errors, "report_type", &self.report_type, MAX_REPORT_TYPE_LEN);
        if self.report_data.trim().is_empty() {
            errors.push("report_data", "must not be empty");
        }
        errors.into_result()
    }
}

impl Validate for ReportUpdate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if let Some(report_type) = &self.report_type {
            check_text(&mut errors, "report_type", report_type, MAX_REPORT_TYPE_LEN);
        }
        if let Some(report_data) = &self.report_data
            && report_data.trim().is_empty()
        {
            errors.push("report_data", "must not be empty");
        }
        errors.into_result()
    }
}
