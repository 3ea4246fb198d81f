//! `HospitalStorage` implementation on PostgreSQL.
//!
//! Rows are fetched as tuples and converted into the storage record types.
//! Timestamps cross the SQL boundary as `chrono::DateTime<Utc>` and are
//! exposed as `time::OffsetDateTime`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgPool, PgTransaction};
use time::OffsetDateTime;

use hospital_storage::{
    HospitalStorage, NewPatient, NewPrescription, NewReport, NewUser, NewVisit, Patient,
    PatientFilter, PatientRemoval, PatientUpdate, Prescription, PrescriptionFilter,
    PrescriptionUpdate, Report, ReportFilter, ReportUpdate, Role, StorageError, User, Validate,
    Visit, VisitFilter, VisitRemoval, VisitUpdate,
};

use crate::config::PostgresConfig;
use crate::error::{PG_UNIQUE_VIOLATION, PostgresError, has_pg_error_code, query_error};
use crate::{migrations, pool};

type UserRow = (i64, String, String, String);
type PatientRow = (i64, String, i32, String, DateTime<Utc>, DateTime<Utc>);
type VisitRow = (i64, i64, i64, DateTime<Utc>, Option<String>);
type PrescriptionRow = (i64, i64, i64, Option<i64>, String, String, i32);
type ReportRow = (i64, i64, String, String, DateTime<Utc>);

fn chrono_to_time(dt: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(dt.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
        + time::Duration::nanoseconds(i64::from(dt.timestamp_subsec_nanos()))
}

fn time_to_chrono(dt: OffsetDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond()).unwrap_or_default()
}

fn user_from_row((id, username, password_hash, role): UserRow) -> Result<User, StorageError> {
    let role = role
        .parse::<Role>()
        .map_err(|e| StorageError::internal(format!("user {id}: {e}")))?;
    Ok(User {
        id,
        username,
        password_hash,
        role,
    })
}

fn patient_from_row(row: PatientRow) -> Patient {
    let (id, name, age, contact_info, created_at, updated_at) = row;
    Patient {
        id,
        name,
        age,
        contact_info,
        created_at: chrono_to_time(created_at),
        updated_at: chrono_to_time(updated_at),
    }
}

fn visit_from_row((id, patient_id, doctor_id, visit_date, diagnosis): VisitRow) -> Visit {
    Visit {
        id,
        patient_id,
        doctor_id,
        visit_date: chrono_to_time(visit_date),
        diagnosis,
    }
}

fn prescription_from_row(row: PrescriptionRow) -> Prescription {
    let (id, patient_id, doctor_id, visit_id, drug_name, dosage, duration) = row;
    Prescription {
        id,
        patient_id,
        doctor_id,
        visit_id,
        drug_name,
        dosage,
        duration,
    }
}

fn report_from_row((id, patient_id, report_type, report_data, created_at): ReportRow) -> Report {
    Report {
        id,
        patient_id,
        report_type,
        report_data,
        created_at: chrono_to_time(created_at),
    }
}

/// PostgreSQL-backed hospital storage.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Wraps an existing pool. Migrations are not run.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the pool and, when configured, applies migrations.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, PostgresError> {
        config.validate().map_err(PostgresError::config)?;
        let pool = pool::create_pool(config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<PgTransaction<'static>, StorageError> {
        self.pool.begin().await.map_err(query_error)
    }
}

async fn require_exists(
    tx: &mut PgTransaction<'static>,
    sql: &'static str,
    kind: &'static str,
    id: i64,
) -> Result<(), StorageError> {
    let exists: bool = query_scalar(sql)
        .bind(id)
        .fetch_one(&mut **tx)
        .await
        .map_err(query_error)?;
    if exists {
        Ok(())
    } else {
        Err(StorageError::invalid_reference(kind, id))
    }
}

async fn require_patient(tx: &mut PgTransaction<'static>, id: i64) -> Result<(), StorageError> {
    require_exists(
        tx,
        "SELECT EXISTS (SELECT 1 FROM patients WHERE id = $1)",
        "patient",
        id,
    )
    .await
}

async fn require_doctor(
    tx: &mut PgTransaction<'static>,
    id: Option<i64>,
) -> Result<i64, StorageError> {
    let id = id.ok_or_else(|| StorageError::invalid_field("doctor_id", "is required"))?;
    require_exists(
        tx,
        "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)",
        "doctor",
        id,
    )
    .await?;
    Ok(id)
}

#[async_trait]
impl HospitalStorage for PostgresStorage {
    async fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        user.validate()?;
        let row: UserRow = query_as(
            "INSERT INTO users (username, password_hash, role) VALUES ($1, $2, $3)
             RETURNING id, username, password_hash, role",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if has_pg_error_code(&e, PG_UNIQUE_VIOLATION) {
                StorageError::already_exists("user", user.username.clone())
            } else {
                query_error(e)
            }
        })?;
        user_from_row(row)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        let row: Option<UserRow> =
            query_as("SELECT id, username, password_hash, role FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;
        row.map(user_from_row).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        let row: Option<UserRow> =
            query_as("SELECT id, username, password_hash, role FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;
        row.map(user_from_row).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let rows: Vec<UserRow> =
            query_as("SELECT id, username, password_hash, role FROM users ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(query_error)?;
        rows.into_iter().map(user_from_row).collect()
    }

    async fn create_patient(&self, patient: NewPatient) -> Result<Patient, StorageError> {
        patient.validate()?;
        let row: PatientRow = query_as(
            "INSERT INTO patients (name, age, contact_info) VALUES ($1, $2, $3)
             RETURNING id, name, age, contact_info, created_at, updated_at",
        )
        .bind(&patient.name)
        .bind(patient.age)
        .bind(&patient.contact_info)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(patient_from_row(row))
    }

    async fn get_patient(&self, id: i64) -> Result<Option<Patient>, StorageError> {
        let row: Option<PatientRow> = query_as(
            "SELECT id, name, age, contact_info, created_at, updated_at
             FROM patients WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(row.map(patient_from_row))
    }

    async fn list_patients(&self, filter: PatientFilter) -> Result<Vec<Patient>, StorageError> {
        let rows: Vec<PatientRow> = query_as(
            "SELECT id, name, age, contact_info, created_at, updated_at
             FROM patients
             WHERE $1::text IS NULL OR strpos(lower(name), lower($1)) > 0
             ORDER BY id",
        )
        .bind(filter.name_contains)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(rows.into_iter().map(patient_from_row).collect())
    }

    async fn update_patient(
        &self,
        id: i64,
        update: PatientUpdate,
    ) -> Result<Patient, StorageError> {
        update.validate()?;
        let mut tx = self.begin().await?;
        let row: Option<PatientRow> = query_as(
            "SELECT id, name, age, contact_info, created_at, updated_at
             FROM patients WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_error)?;
        let mut patient = row
            .map(patient_from_row)
            .ok_or_else(|| StorageError::not_found("patient", id))?;
        update.apply(&mut patient);

        let row: PatientRow = query_as(
            "UPDATE patients SET name = $2, age = $3, contact_info = $4, updated_at = now()
             WHERE id = $1
             RETURNING id, name, age, contact_info, created_at, updated_at",
        )
        .bind(id)
        .bind(&patient.name)
        .bind(patient.age)
        .bind(&patient.contact_info)
        .fetch_one(&mut *tx)
        .await
        .map_err(query_error)?;
        tx.commit().await.map_err(query_error)?;
        Ok(patient_from_row(row))
    }

    async fn delete_patient(&self, id: i64) -> Result<PatientRemoval, StorageError> {
        let mut tx = self.begin().await?;
        let visit_ids: Vec<i64> =
            query_scalar("SELECT id FROM visits WHERE patient_id = $1 ORDER BY id")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .map_err(query_error)?;
        let prescription_ids: Vec<i64> =
            query_scalar("SELECT id FROM prescriptions WHERE patient_id = $1 ORDER BY id")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .map_err(query_error)?;
        let report_ids: Vec<i64> =
            query_scalar("SELECT id FROM reports WHERE patient_id = $1 ORDER BY id")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .map_err(query_error)?;

        // Dependent rows go with ON DELETE CASCADE.
        let row: Option<PatientRow> = query_as(
            "DELETE FROM patients WHERE id = $1
             RETURNING id, name, age, contact_info, created_at, updated_at",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_error)?;
        let patient = row
            .map(patient_from_row)
            .ok_or_else(|| StorageError::not_found("patient", id))?;
        tx.commit().await.map_err(query_error)?;

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
        let mut tx = self.begin().await?;
        require_patient(&mut tx, visit.patient_id).await?;
        let doctor_id = require_doctor(&mut tx, visit.doctor_id).await?;
        let row: VisitRow = query_as(
            "INSERT INTO visits (patient_id, doctor_id, visit_date, diagnosis)
             VALUES ($1, $2, COALESCE($3, now()), $4)
             RETURNING id, patient_id, doctor_id, visit_date, diagnosis",
        )
        .bind(visit.patient_id)
        .bind(doctor_id)
        .bind(visit.visit_date.map(time_to_chrono))
        .bind(visit.diagnosis)
        .fetch_one(&mut *tx)
        .await
        .map_err(query_error)?;
        tx.commit().await.map_err(query_error)?;
        Ok(visit_from_row(row))
    }

    async fn get_visit(&self, id: i64) -> Result<Option<Visit>, StorageError> {
        let row: Option<VisitRow> = query_as(
            "SELECT id, patient_id, doctor_id, visit_date, diagnosis FROM visits WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(row.map(visit_from_row))
    }

    async fn list_visits(&self, filter: VisitFilter) -> Result<Vec<Visit>, StorageError> {
        let rows: Vec<VisitRow> = query_as(
            "SELECT id, patient_id, doctor_id, visit_date, diagnosis FROM visits
             WHERE $1::bigint IS NULL OR patient_id = $1
             ORDER BY id",
        )
        .bind(filter.patient_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(rows.into_iter().map(visit_from_row).collect())
    }

    async fn update_visit(&self, id: i64, update: VisitUpdate) -> Result<Visit, StorageError> {
        update.validate()?;
        let row: Option<VisitRow> = query_as(
            "UPDATE visits
             SET visit_date = COALESCE($2, visit_date),
                 diagnosis = CASE WHEN $3 THEN $4 ELSE diagnosis END
             WHERE id = $1
             RETURNING id, patient_id, doctor_id, visit_date, diagnosis",
        )
        .bind(id)
        .bind(update.visit_date.map(time_to_chrono))
        .bind(update.diagnosis.is_some())
        .bind(update.diagnosis.flatten())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        row.map(visit_from_row)
            .ok_or_else(|| StorageError::not_found("visit", id))
    }

    async fn delete_visit(&self, id: i64) -> Result<VisitRemoval, StorageError> {
        let mut tx = self.begin().await?;
        let detached_prescription_ids: Vec<i64> =
            query_scalar("SELECT id FROM prescriptions WHERE visit_id = $1 ORDER BY id")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .map_err(query_error)?;
        // Prescriptions are detached by ON DELETE SET NULL.
        let row: Option<VisitRow> = query_as(
            "DELETE FROM visits WHERE id = $1
             RETURNING id, patient_id, doctor_id, visit_date, diagnosis",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_error)?;
        let visit = row
            .map(visit_from_row)
            .ok_or_else(|| StorageError::not_found("visit", id))?;
        tx.commit().await.map_err(query_error)?;
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
        let mut tx = self.begin().await?;
        require_patient(&mut tx, prescription.patient_id).await?;
        let doctor_id = require_doctor(&mut tx, prescription.doctor_id).await?;
        if let Some(visit_id) = prescription.visit_id {
            let owner: Option<i64> = query_scalar("SELECT patient_id FROM visits WHERE id = $1")
                .bind(visit_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(query_error)?;
            match owner {
                Some(patient_id) if patient_id == prescription.patient_id => {}
                Some(_) => {
                    return Err(StorageError::invalid_field(
                        "visit_id",
                        "visit belongs to a different patient",
                    ));
                }
                None => return Err(StorageError::invalid_reference("visit", visit_id)),
            }
        }
        let row: PrescriptionRow = query_as(
            "INSERT INTO prescriptions (patient_id, doctor_id, visit_id, drug_name, dosage, duration)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, patient_id, doctor_id, visit_id, drug_name, dosage, duration",
        )
        .bind(prescription.patient_id)
        .bind(doctor_id)
        .bind(prescription.visit_id)
        .bind(&prescription.drug_name)
        .bind(&prescription.dosage)
        .bind(prescription.duration)
        .fetch_one(&mut *tx)
        .await
        .map_err(query_error)?;
        tx.commit().await.map_err(query_error)?;
        Ok(prescription_from_row(row))
    }

    async fn get_prescription(&self, id: i64) -> Result<Option<Prescription>, StorageError> {
        let row: Option<PrescriptionRow> = query_as(
            "SELECT id, patient_id, doctor_id, visit_id, drug_name, dosage, duration
             FROM prescriptions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(row.map(prescription_from_row))
    }

    async fn list_prescriptions(
        &self,
        filter: PrescriptionFilter,
    ) -> Result<Vec<Prescription>, StorageError> {
        let rows: Vec<PrescriptionRow> = query_as(
            "SELECT id, patient_id, doctor_id, visit_id, drug_name, dosage, duration
             FROM prescriptions
             WHERE $1::bigint IS NULL OR patient_id = $1
             ORDER BY id",
        )
        .bind(filter.patient_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(rows.into_iter().map(prescription_from_row).collect())
    }

    async fn update_prescription(
        &self,
        id: i64,
        update: PrescriptionUpdate,
    ) -> Result<Prescription, StorageError> {
        update.validate()?;
        let row: Option<PrescriptionRow> = query_as(
            "UPDATE prescriptions
             SET drug_name = COALESCE($2, drug_name),
                 dosage = COALESCE($3, dosage),
                 duration = COALESCE($4, duration)
             WHERE id = $1
             RETURNING id, patient_id, doctor_id, visit_id, drug_name, dosage, duration",
        )
        .bind(id)
        .bind(update.drug_name)
        .bind(update.dosage)
        .bind(update.duration)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        row.map(prescription_from_row)
            .ok_or_else(|| StorageError::not_found("prescription", id))
    }

    async fn delete_prescription(&self, id: i64) -> Result<Prescription, StorageError> {
        let row: Option<PrescriptionRow> = query_as(
            "DELETE FROM prescriptions WHERE id = $1
             RETURNING id, patient_id, doctor_id, visit_id, drug_name, dosage, duration",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        row.map(prescription_from_row)
            .ok_or_else(|| StorageError::not_found("prescription", id))
    }

    async fn create_report(&self, report: NewReport) -> Result<Report, StorageError> {
        report.validate()?;
        let mut tx = self.begin().await?;
        require_patient(&mut tx, report.patient_id).await?;
        let row: ReportRow = query_as(
            "INSERT INTO reports (patient_id, report_type, report_data) VALUES ($1, $2, $3)
             RETURNING id, patient_id, report_type, report_data, created_at",
        )
        .bind(report.patient_id)
        .bind(&report.report_type)
        .bind(&report.report_data)
        .fetch_one(&mut *tx)
        .await
        .map_err(query_error)?;
        tx.commit().await.map_err(query_error)?;
        Ok(report_from_row(row))
    }

    async fn get_report(&self, id: i64) -> Result<Option<Report>, StorageError> {
        let row: Option<ReportRow> = query_as(
            "SELECT id, patient_id, report_type, report_data, created_at
             FROM reports WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(row.map(report_from_row))
    }

    async fn list_reports(&self, filter: ReportFilter) -> Result<Vec<Report>, StorageError> {
        let rows: Vec<ReportRow> = query_as(
            "SELECT id, patient_id, report_type, report_data, created_at
             FROM reports
             WHERE $1::bigint IS NULL OR patient_id = $1
             ORDER BY id",
        )
        .bind(filter.patient_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(rows.into_iter().map(report_from_row).collect())
    }

    async fn update_report(&self, id: i64, update: ReportUpdate) -> Result<Report, StorageError> {
        update.validate()?;
        let row: Option<ReportRow> = query_as(
            "UPDATE reports
             SET report_type = COALESCE($2, report_type), report_data = COALESCE($3, report_data)
             WHERE id = $1
             RETURNING id, patient_id, report_type, report_data, created_at",
        )
        .bind(id)
        .bind(update.report_type)
        .bind(update.report_data)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        row.map(report_from_row)
            .ok_or_else(|| StorageError::not_found("report", id))
    }

    async fn delete_report(&self, id: i64) -> Result<Report, StorageError> {
        let row: Option<ReportRow> = query_as(
            "DELETE FROM reports WHERE id = $1
             RETURNING id, patient_id, report_type, report_data, created_at",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        row.map(report_from_row)
            .ok_or_else(|| StorageError::not_found("report", id))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_survive_conversion() {
        let now = OffsetDateTime::now_utc();
        let back = chrono_to_time(time_to_chrono(now));
        assert_eq!(back.unix_timestamp(), now.unix_timestamp());
        assert_eq!(back.nanosecond(), now.nanosecond());
    }

    #[test]
    fn unknown_role_is_an_internal_error() {
        let err = user_from_row((1, "x".into(), "h".into(), "janitor".into())).unwrap_err();
        assert!(matches!(err, StorageError::Internal { .. }));
    }
}
