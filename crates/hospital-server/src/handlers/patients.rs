use axum::extract::{Query, State};
use axum::response::IntoResponse;
use hospital_api::{ApiError, ApiResponse, Collection, EntityKind, Resource};
use hospital_storage::{NewPatient, PatientFilter, PatientUpdate, StorageError};
use serde::Deserialize;

use super::Deleted;
use crate::cache::keys;
use crate::extract::{BaseUrl, RecordId, ValidJson};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PatientQuery {
    /// Case-insensitive name fragment.
    pub q: Option<String>,
}

pub async fn list_patients(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    Query(query): Query<PatientQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let term = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty());
    let patients = match term {
        // name searches bypass the cache
        Some(term) => {
            state
                .storage
                .list_patients(PatientFilter {
                    name_contains: Some(term.to_string()),
                })
                .await?
        }
        None => {
            state
                .cache
                .get_or_compute(&keys::patient_list(), None, || {
                    state.storage.list_patients(PatientFilter::default())
                })
                .await?
        }
    };
    Ok(ApiResponse::ok(Collection::linked(
        &base,
        EntityKind::Patient,
        patients,
    )))
}

pub async fn get_patient(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    RecordId(id): RecordId,
) -> Result<impl IntoResponse, ApiError> {
    let patient = state
        .cache
        .get_or_compute(&keys::patient(id), None, || async {
            state
                .storage
                .get_patient(id)
                .await?
                .ok_or_else(|| StorageError::not_found("patient", id))
        })
        .await?;
    Ok(ApiResponse::ok(Resource::linked(&base, patient)))
}

pub async fn create_patient(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    ValidJson(payload): ValidJson<NewPatient>,
) -> Result<impl IntoResponse, ApiError> {
    let patient = state.storage.create_patient(payload).await?;
    tracing::info!(patient_id = patient.id, "patient created");
    state.cache.invalidate(keys::patient_written(patient.id)).await;

    let location = format!(
        "{}{}",
        base.trim_end_matches('/'),
        EntityKind::Patient.item_path(patient.id)
    );
    Ok(ApiResponse::created(
        Resource::linked(&base, patient),
        &location,
    ))
}

pub async fn update_patient(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    RecordId(id): RecordId,
    ValidJson(payload): ValidJson<PatientUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let patient = state.storage.update_patient(id, payload).await?;
    tracing::info!(patient_id = id, "patient updated");
    state.cache.invalidate(keys::patient_written(id)).await;
    Ok(ApiResponse::ok(Resource::linked(&base, patient)))
}

/// Deletes the patient and everything recorded for them.
pub async fn delete_patient(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    RecordId(id): RecordId,
) -> Result<impl IntoResponse, ApiError> {
    let removal = state.storage.delete_patient(id).await?;
    tracing::info!(
        patient_id = id,
        visits = removal.visit_ids.len(),
        prescriptions = removal.prescription_ids.len(),
        reports = removal.report_ids.len(),
        "patient deleted"
    );
    state.cache.invalidate(keys::patient_removed(&removal)).await;
    Ok(ApiResponse::ok(Deleted::new(
        &base,
        EntityKind::Patient,
        format!("Patient {id} deleted"),
    )))
}
