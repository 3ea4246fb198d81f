//! Cache key construction.
//!
//! Every key is `{operation}:[{positional,...}]:{{name=value,...}}`, built by
//! [`cache_key`]. Read paths and invalidation paths both go through the
//! helpers below, so a write always names exactly the keys its reads used.

use hospital_storage::{PatientRemoval, Prescription, Report, Visit, VisitRemoval};
use std::fmt::Display;

/// Builds a key from an operation name and its arguments. Keyword arguments
/// are sorted by name, so their order at the call site does not matter.
pub fn cache_key(operation: &str, positional: &[&dyn Display], keyword: &[(&str, &dyn Display)]) -> String {
    let positional = positional
        .iter()
        .map(|arg| arg.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let mut keyword: Vec<(&str, String)> = keyword
        .iter()
        .map(|(name, value)| (*name, value.to_string()))
        .collect();
    keyword.sort_by(|a, b| a.0.cmp(b.0));
    let keyword = keyword
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{operation}:[{positional}]:{{{keyword}}}")
}

fn item(operation: &str, id: i64) -> String {
    cache_key(operation, &[&id], &[])
}

fn list(operation: &str, patient: Option<i64>) -> String {
    match patient {
        Some(patient) => cache_key(operation, &[], &[("patient", &patient)]),
        None => cache_key(operation, &[], &[]),
    }
}

pub fn patient(id: i64) -> String {
    item("patient.get", id)
}

/// The unfiltered patient list. Name searches are not cached.
pub fn patient_list() -> String {
    list("patient.list", None)
}

pub fn visit(id: i64) -> String {
    item("visit.get", id)
}

pub fn visit_list(patient: Option<i64>) -> String {
    list("visit.list", patient)
}

pub fn prescription(id: i64) -> String {
    item("prescription.get", id)
}

pub fn prescription_list(patient: Option<i64>) -> String {
    list("prescription.list", patient)
}

pub fn report(id: i64) -> String {
    item("report.get", id)
}

pub fn report_list(patient: Option<i64>) -> String {
    list("report.list", patient)
}

// ==================== Invalidation sets ====================

/// Keys stale after a patient is created or updated.
pub fn patient_written(id: i64) -> Vec<String> {
    vec![patient(id), patient_list()]
}

/// Keys stale after a patient and everything attached to it is deleted.
pub fn patient_removed(removal: &PatientRemoval) -> Vec<String> {
    let id = removal.patient.id;
    let mut keys = patient_written(id);
    keys.extend([
        visit_list(None),
        visit_list(Some(id)),
        prescription_list(None),
        prescription_list(Some(id)),
        report_list(None),
        report_list(Some(id)),
    ]);
    keys.extend(removal.visit_ids.iter().map(|&v| visit(v)));
    keys.extend(removal.prescription_ids.iter().map(|&p| prescription(p)));
    keys.extend(removal.report_ids.iter().map(|&r| report(r)));
    keys
}

pub fn visit_written(visit: &Visit) -> Vec<String> {
    vec![
        self::visit(visit.id),
        visit_list(None),
        visit_list(Some(visit.patient_id)),
    ]
}

/// A deleted visit also changes the prescriptions that pointed at it.
pub fn visit_removed(removal: &VisitRemoval) -> Vec<String> {
    let mut keys = visit_written(&removal.visit);
    if !removal.detached_prescription_ids.is_empty() {
        keys.extend(
            removal
                .detached_prescription_ids
                .iter()
                .map(|&p| prescription(p)),
        );
        keys.push(prescription_list(None));
        keys.push(prescription_list(Some(removal.visit.patient_id)));
    }
    keys
}

pub fn prescription_written(prescription: &Prescription) -> Vec<String> {
    vec![
        self::prescription(prescription.id),
        prescription_list(None),
        prescription_list(Some(prescription.patient_id)),
    ]
}

pub fn report_written(report: &Report) -> Vec<String> {
    vec![
        self::report(report.id),
        report_list(None),
        report_list(Some(report.patient_id)),
    ]
}
