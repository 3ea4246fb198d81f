use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use hospital_storage::{
    HospitalStorage, NewPatient, NewPrescription, NewReport, NewUser, NewVisit, Patient,
    PatientFilter, PatientRemoval, PatientUpdate, Prescription, PrescriptionFilter,
    PrescriptionUpdate, Report, ReportFilter, ReportUpdate, StorageError, User, Validate, Visit,
    VisitFilter, VisitRemoval, VisitUpdate,
};
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    patients: BTreeMap<i64, Patient>,
    visits: BTreeMap<i64, Visit>,
    prescriptions: BTreeMap<i64, Prescription>,
    reports: BTreeMap<i64, Report>,
    next_id: i64,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_patient(&self, id: i64) -> Result<(), StorageError> {
        if self.patients.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::invalid_reference("patient", id))
        }
    }

    fn require_doctor(&self, id: Option<i64>) -> Result<i64, StorageError> {
        let id = id.ok_or_else(|| StorageError::invalid_field("doctor_id", "is required"))?;
        if self.users.contains_key(&id) {
            Ok(id)
        } else {
            Err(StorageError::invalid_reference("doctor", id))
        }
    }
}

/// Read/write counters, used by tests to observe whether a request reached
/// the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub reads: u64,
    pub writes: u64,
}

/// In-memory hospital storage.
///
/// Ids are allocated from one counter shared by all tables, so they are
/// unique across record kinds. Listings are ordered by id.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            reads: self.reads.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
        }
    }

    fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl HospitalStorage for InMemoryStorage {
    async fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        user.validate()?;
        self.record_write();
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StorageError::already_exists("user", user.username));
        }
        let id = tables.allocate_id();
        let created = User {
            id,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
        };
        tables.users.insert(id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        self.record_read();
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        self.record_read();
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        self.record_read();
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn create_patient(&self, patient: NewPatient) -> Result<Patient, StorageError> {
        patient.validate()?;
        self.record_write();
        let mut tables = self.tables.write().await;
        let id = tables.allocate_id();
        let now = OffsetDateTime::now_utc();
        let created = Patient {
            id,
            name: patient.name,
            age: patient.age,
            contact_info: patient.contact_info,
            created_at: now,
            updated_at: now,
        };
        tables.patients.insert(id, created.clone());
        Ok(created)
    }

    async fn get_patient(&self, id: i64) -> Result<Option<Patient>, StorageError> {
        self.record_read();
        Ok(self.tables.read().await.patients.get(&id).cloned())
    }

    async fn list_patients(&self, filter: PatientFilter) -> Result<Vec<Patient>, StorageError> {
        self.record_read();
        let needle = filter.name_contains.map(|q| q.to_lowercase());
        let tables = self.tables.read().await;
        Ok(tables
            .patients
            .values()
            .filter(|p| match &needle {
                Some(q) => p.name.to_lowercase().contains(q),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn update_patient(
        &self,
        id: i64,
        update: PatientUpdate,
    ) -> Result<Patient, StorageError> {
        update.validate()?;
        self.record_write();
        let mut tables = self.tables.write().await;
        let patient = tables
            .patients
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("patient", id))?;
        update.apply(patient);
        patient.updated_at = OffsetDateTime::now_utc();
        Ok(patient.clone())
    }

    async fn delete_patient(&self, id: i64) -> Result<PatientRemoval, StorageError> {
        self.record_write();
        let mut tables = self.tables.write().await;
        let patient = tables
            .patients
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("patient", id))?;

        let visit_ids: Vec<i64> = tables
            .visits
            .values()
            .filter(|v| v.patient_id == id)
            .map(|v| v.id)
            .collect();
        let prescription_ids: Vec<i64> = tables
            .prescriptions
            .values()
            .filter(|p| p.patient_id == id)
            .map(|p| p.id)
            .collect();
        let report_ids: Vec<i64> = tables
            .reports
            .values()
            .filter(|r| r.patient_id == id)
            .map(|r| r.id)
            .collect();

        for visit_id in &visit_ids {
            tables.visits.remove(visit_id);
        }
        for prescription_id in &prescription_ids {
            tables.prescriptions.remove(prescription_id);
        }
        for report_id in &report_ids {
            tables.reports.remove(report_id);
        }

        tracing::debug!(
            patient_id = id,
            visits = visit_ids.len(),
            prescriptions = prescription_ids.len(),
            reports = report_ids.len(),
            "patient deleted with dependents"
        );

        Ok(PatientRemoval {
            patient,
            visit_ids,
            prescription_ids,
            report_ids,
        })
    }

    async fn create_visit(&self, visit: NewVisit) -> Result<Visit, StorageError> {
        visit.validate()?;
        self.record_write();
        let mut tables = self.tables.write().await;
        tables.require_patient(visit.patient_id)?;
        let doctor_id = tables.require_doctor(visit.doctor_id)?;
        let id = tables.allocate_id();
        let created = Visit {
            id,
            patient_id: visit.patient_id,
            doctor_id,
            visit_date: visit.visit_date.unwrap_or_else(OffsetDateTime::now_utc),
            diagnosis: visit.diagnosis,
        };
        tables.visits.insert(id, created.clone());
        Ok(created)
    }

    async fn get_visit(&self, id: i64) -> Result<Option<Visit>, StorageError> {
        self.record_read();
        Ok(self.tables.read().await.visits.get(&id).cloned())
    }

    async fn list_visits(&self, filter: VisitFilter) -> Result<Vec<Visit>, StorageError> {
        self.record_read();
        let tables = self.tables.read().await;
        Ok(tables
            .visits
            .values()
            .filter(|v| filter.patient_id.is_none_or(|p| v.patient_id == p))
            .cloned()
            .collect())
    }

    async fn update_visit(&self, id: i64, update: VisitUpdate) -> Result<Visit, StorageError> {
        update.validate()?;
        self.record_write();
        let mut tables = self.tables.write().await;
        let visit = tables
            .visits
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("visit", id))?;
        update.apply(visit);
        Ok(visit.clone())
    }

    async fn delete_visit(&self, id: i64) -> Result<VisitRemoval, StorageError> {
        self.record_write();
        let mut tables = self.tables.write().await;
        let visit = tables
            .visits
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("visit", id))?;
        let mut detached_prescription_ids = Vec::new();
        for prescription in tables.prescriptions.values_mut() {
            if prescription.visit_id == Some(id) {
                prescription.visit_id = None;
                detached_prescription_ids.push(prescription.id);
            }
        }
        Ok(VisitRemoval {
            visit,
            detached_prescription_ids,
        })
    }

    async fn create_prescription(
        &self,
        prescription: NewPrescription,
    ) -> Result<Prescription, StorageError> {
        prescription.validate()?;
        self.record_write();
        let mut tables = self.tables.write().await;
        tables.require_patient(prescription.patient_id)?;
        let doctor_id = tables.require_doctor(prescription.doctor_id)?;
        if let Some(visit_id) = prescription.visit_id {
            match tables.visits.get(&visit_id) {
                Some(visit) if visit.patient_id == prescription.patient_id => {}
                Some(_) => {
                    return Err(StorageError::invalid_field(
                        "visit_id",
                        "visit belongs to a different patient",
                    ));
                }
                None => return Err(StorageError::invalid_reference("visit", visit_id)),
            }
        }
        let id = tables.allocate_id();
        let created = Prescription {
            id,
            patient_id: prescription.patient_id,
            doctor_id,
            visit_id: prescription.visit_id,
            drug_name: prescription.drug_name,
            dosage: prescription.dosage,
            duration: prescription.duration,
        };
        tables.prescriptions.insert(id, created.clone());
        Ok(created)
    }

    async fn get_prescription(&self, id: i64) -> Result<Option<Prescription>, StorageError> {
        self.record_read();
        Ok(self.tables.read().await.prescriptions.get(&id).cloned())
    }

    async fn list_prescriptions(
        &self,
        filter: PrescriptionFilter,
    ) -> Result<Vec<Prescription>, StorageError> {
        self.record_read();
        let tables = self.tables.read().await;
        Ok(tables
            .prescriptions
            .values()
            .filter(|p| filter.patient_id.is_none_or(|id| p.patient_id == id))
            .cloned()
            .collect())
    }

    async fn update_prescription(
        &self,
        id: i64,
        update: PrescriptionUpdate,
    ) -> Result<Prescription, StorageError> {
        update.validate()?;
        self.record_write();
        let mut tables = self.tables.write().await;
        let prescription = tables
            .prescriptions
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("prescription", id))?;
        update.apply(prescription);
        Ok(prescription.clone())
    }

    async fn delete_prescription(&self, id: i64) -> Result<Prescription, StorageError> {
        self.record_write();
        self.tables
            .write()
            .await
            .prescriptions
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("prescription", id))
    }

    async fn create_report(&self, report: NewReport) -> Result<Report, StorageError> {
        report.validate()?;
        self.record_write();
        let mut tables = self.tables.write().await;
        tables.require_patient(report.patient_id)?;
        let id = tables.allocate_id();
        let created = Report {
            id,
            patient_id: report.patient_id,
            report_type: report.report_type,
            report_data: report.report_data,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.reports.insert(id, created.clone());
        Ok(created)
    }

    async fn get_report(&self, id: i64) -> Result<Option<Report>, StorageError> {
        self.record_read();
        Ok(self.tables.read().await.reports.get(&id).cloned())
    }

    async fn list_reports(&self, filter: ReportFilter) -> Result<Vec<Report>, StorageError> {
        self.record_read();
        let tables = self.tables.read().await;
        Ok(tables
            .reports
            .values()
            .filter(|r| filter.patient_id.is_none_or(|id| r.patient_id == id))
            .cloned()
            .collect())
    }

    async fn update_report(&self, id: i64, update: ReportUpdate) -> Result<Report, StorageError> {
        update.validate()?;
        self.record_write();
        let mut tables = self.tables.write().await;
        let report = tables
            .reports
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("report", id))?;
        update.apply(report);
        Ok(report.clone())
    }

    async fn delete_report(&self, id: i64) -> Result<Report, StorageError> {
        self.record_write();
        self.tables
            .write()
            .await
            .reports
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("report", id))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
