//! Record types stored by every backend.
//!
//! Timestamps are `time::OffsetDateTime` in UTC and serialize as RFC 3339.
//! Create payloads (`New*`) carry required fields; update payloads (`*Update`)
//! are all-optional and applied as a partial update.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Role of an authenticated account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Doctor,
    Nurse,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "doctor" => Ok(Role::Doctor),
            "nurse" => Ok(Role::Nurse),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A login account. The password hash is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub age: i32,
    pub contact_info: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub age: i32,
    pub contact_info: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub contact_info: Option<String>,
}

impl PatientUpdate {
    pub fn apply(self, patient: &mut Patient) {
        if let Some(name) = self.name {
            patient.name = name;
        }
        if let Some(age) = self.age {
            patient.age = age;
        }
        if let Some(contact_info) = self.contact_info {
            patient.contact_info = contact_info;
        }
    }
}

/// Listing filter for patients. `name_contains` is a case-insensitive
/// substring match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientFilter {
    pub name_contains: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub visit_date: OffsetDateTime,
    pub diagnosis: Option<String>,
}

/// `doctor_id` is filled from the authenticated account when absent.
/// `visit_date` defaults to the time of insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVisit {
    pub patient_id: i64,
    #[serde(default)]
    pub doctor_id: Option<i64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub visit_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub diagnosis: Option<String>,
}

/// An absent `diagnosis` leaves it unchanged; `"diagnosis": null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitUpdate {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub visit_date: Option<OffsetDateTime>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub diagnosis: Option<Option<String>>,
}

impl VisitUpdate {
    pub fn apply(self, visit: &mut Visit) {
        if let Some(visit_date) = self.visit_date {
            visit.visit_date = visit_date;
        }
        if let Some(diagnosis) = self.diagnosis {
            visit.diagnosis = diagnosis;
        }
    }
}

/// Distinguishes a field sent as `null` (`Some(None)`) from one left out
/// (`None`, via `#[serde(default)]`).
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitFilter {
    pub patient_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub visit_id: Option<i64>,
    pub drug_name: String,
    pub dosage: String,
    /// Duration in days.
    pub duration: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPrescription {
    pub patient_id: i64,
    #[serde(default)]
    pub doctor_id: Option<i64>,
    #[serde(default)]
    pub visit_id: Option<i64>,
    pub drug_name: String,
    pub dosage: String,
    pub duration: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriptionUpdate {
    #[serde(default)]
    pub drug_name: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub duration: Option<i32>,
}

impl PrescriptionUpdate {
    pub fn apply(self, prescription: &mut Prescription) {
        if let Some(drug_name) = self.drug_name {
            prescription.drug_name = drug_name;
        }
        if let Some(dosage) = self.dosage {
            prescription.dosage = dosage;
        }
        if let Some(duration) = self.duration {
            prescription.duration = duration;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrescriptionFilter {
    pub patient_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub patient_id: i64,
    pub report_type: String,
    pub report_data: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReport {
    pub patient_id: i64,
    pub report_type: String,
    pub report_data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportUpdate {
    #[serde(default)]
    pub report_type: Option<String>,
    #[serde(default)]
    pub report_data: Option<String>,
}

impl ReportUpdate {
    pub fn apply(self, report: &mut Report) {
        if let Some(report_type) = self.report_type {
            report.report_type = report_type;
        }
        if let Some(report_data) = self.report_data {
            report.report_data = report_data;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub patient_id: Option<i64>,
}

/// Result of deleting a patient: the removed record and the ids of every
/// dependent record removed with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientRemoval {
    pub patient: Patient,
    pub visit_ids: Vec<i64>,
    pub prescription_ids: Vec<i64>,
    pub report_ids: Vec<i64>,
}

/// Result of deleting a visit: the removed record and the prescriptions that
/// were detached from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitRemoval {
    pub visit: Visit,
    pub detached_prescription_ids: Vec<i64>,
}
