//! Startup provisioning: the configured admin account and optional demo
//! records.

use hospital_auth::{AuthError, AuthService};
use hospital_storage::{
    DynStorage, NewPatient, NewPrescription, NewReport, NewVisit, PatientFilter, Role,
    StorageError,
};
use time::OffsetDateTime;
use time::macros::datetime;

use crate::config::{AdminUserConfig, BootstrapConfig};

/// Password shared by the demo doctor accounts.
pub const DEMO_PASSWORD: &str = "password123";

const DEMO_DOCTORS: [&str; 3] = ["dr_smith", "dr_jones", "dr_wilson"];

struct DemoRecord {
    patient: (&'static str, i32, &'static str),
    doctor: usize,
    visit_date: OffsetDateTime,
    diagnosis: &'static str,
    drug: (&'static str, &'static str, i32),
    report: (&'static str, &'static str),
}

const DEMO_RECORDS: [DemoRecord; 4] = [
    DemoRecord {
        patient: ("Alice Johnson", 30, "alice@example.com"),
        doctor: 0,
        visit_date: datetime!(2023-01-01 0:00 UTC),
        diagnosis: "Flu",
        drug: ("Paracetamol", "500mg", 7),
        report: ("Blood Test", "Normal CBC, slightly elevated WBC"),
    },
    DemoRecord {
        patient: ("Bob Wilson", 45, "bob@example.com"),
        doctor: 1,
        visit_date: datetime!(2023-01-15 0:00 UTC),
        diagnosis: "Cold",
        drug: ("Ibuprofen", "400mg", 5),
        report: ("X-Ray", "Clear lungs, no abnormalities"),
    },
    DemoRecord {
        patient: ("Carol Davis", 28, "carol@example.com"),
        doctor: 2,
        visit_date: datetime!(2023-02-01 0:00 UTC),
        diagnosis: "Allergy",
        drug: ("Antihistamine", "10mg", 14),
        report: ("Allergy Test", "Positive for pollen and dust mites"),
    },
    DemoRecord {
        patient: ("David Brown", 60, "david@example.com"),
        doctor: 0,
        visit_date: datetime!(2023-02-15 0:00 UTC),
        diagnosis: "Hypertension",
        drug: ("Lisinopril", "10mg", 30),
        report: ("Blood Pressure", "140/90 mmHg, elevated"),
    },
];

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("bootstrap failed: {0}")]
    Auth(#[from] AuthError),

    #[error("bootstrap failed: {0}")]
    Storage(#[from] StorageError),
}

pub async fn run(
    config: &BootstrapConfig,
    auth: &AuthService,
    storage: &DynStorage,
) -> Result<(), BootstrapError> {
    if let Some(admin) = &config.admin_user {
        ensure_admin_user(admin, auth, storage).await?;
    }
    if config.seed_demo_data {
        seed_demo_data(auth, storage).await?;
    }
    Ok(())
}

async fn ensure_admin_user(
    admin: &AdminUserConfig,
    auth: &AuthService,
    storage: &DynStorage,
) -> Result<(), BootstrapError> {
    if storage.find_user_by_username(&admin.username).await?.is_some() {
        tracing::debug!(username = %admin.username, "admin user already exists");
        return Ok(());
    }
    let user = auth
        .register(&admin.username, &admin.password, Role::Admin)
        .await?;
    tracing::info!(user_id = user.id, username = %user.username, "admin user created");
    Ok(())
}

/// Seeds doctors, patients and one visit, prescription and report per
/// patient. Skipped when any patient exists.
pub async fn seed_demo_data(auth: &AuthService, storage: &DynStorage) -> Result<(), BootstrapError> {
    if !storage
        .list_patients(PatientFilter::default())
        .await?
        .is_empty()
    {
        tracing::info!("storage already holds patients, skipping demo data");
        return Ok(());
    }

    let mut doctor_ids = Vec::with_capacity(DEMO_DOCTORS.len());
    for username in DEMO_DOCTORS {
        let id = match storage.find_user_by_username(username).await? {
            Some(user) => user.id,
            None => auth.register(username, DEMO_PASSWORD, Role::Doctor).await?.id,
        };
        doctor_ids.push(id);
    }

    for record in &DEMO_RECORDS {
        let (name, age, contact_info) = record.patient;
        let doctor_id = doctor_ids[record.doctor];
        let patient = storage
            .create_patient(NewPatient {
                name: name.to_string(),
                age,
                contact_info: contact_info.to_string(),
            })
            .await?;
        let visit = storage
            .create_visit(NewVisit {
                patient_id: patient.id,
                doctor_id: Some(doctor_id),
                visit_date: Some(record.visit_date),
                diagnosis: Some(record.diagnosis.to_string()),
            })
            .await?;
        let (drug_name, dosage, duration) = record.drug;
        storage
            .create_prescription(NewPrescription {
                patient_id: patient.id,
                doctor_id: Some(doctor_id),
                visit_id: Some(visit.id),
                drug_name: drug_name.to_string(),
                dosage: dosage.to_string(),
                duration,
            })
            .await?;
        let (report_type, report_data) = record.report;
        storage
            .create_report(NewReport {
                patient_id: patient.id,
                report_type: report_type.to_string(),
                report_data: report_data.to_string(),
            })
            .await?;
    }

    tracing::info!(
        doctors = doctor_ids.len(),
        patients = DEMO_RECORDS.len(),
        "demo data seeded"
    );
    Ok(())
}
