use axum::extract::{Query, State};
use axum::response::IntoResponse;
use hospital_api::{ApiError, ApiResponse, Collection, EntityKind, Resource};
use hospital_storage::{NewPrescription, PrescriptionFilter, PrescriptionUpdate, StorageError};
use serde::Deserialize;

use super::Deleted;
use crate::cache::keys;
use crate::extract::{BaseUrl, CurrentUser, RecordId, ValidJson};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PrescriptionQuery {
    pub patient: Option<i64>,
}

pub async fn list_prescriptions(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    Query(query): Query<PrescriptionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = PrescriptionFilter {
        patient_id: query.patient,
    };
    let prescriptions = state
        .cache
        .get_or_compute(&keys::prescription_list(query.patient), None, || {
            state.storage.list_prescriptions(filter)
        })
        .await?;
    Ok(ApiResponse::ok(Collection::linked(
        &base,
        EntityKind::Prescription,
        prescriptions,
    )))
}

pub async fn get_prescription(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    RecordId(id): RecordId,
) -> Result<impl IntoResponse, ApiError> {
    let prescription = state
        .cache
        .get_or_compute(&keys::prescription(id), None, || async {
            state
                .storage
                .get_prescription(id)
                .await?
                .ok_or_else(|| StorageError::not_found("prescription", id))
        })
        .await?;
    Ok(ApiResponse::ok(Resource::linked(&base, prescription)))
}

/// `doctor_id` defaults to the caller; `visit_id` is optional.
pub async fn create_prescription(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    user: CurrentUser,
    ValidJson(mut payload): ValidJson<NewPrescription>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.doctor_id.is_none() {
        payload.doctor_id = user.user_id();
    }
    let prescription = state.storage.create_prescription(payload).await?;
    tracing::info!(
        prescription_id = prescription.id,
        patient_id = prescription.patient_id,
        drug = %prescription.drug_name,
        "prescription created"
    );
    state
        .cache
        .invalidate(keys::prescription_written(&prescription))
        .await;

    let location = format!(
        "{}{}",
        base.trim_end_matches('/'),
        EntityKind::Prescription.item_path(prescription.id)
    );
    Ok(ApiResponse::created(
        Resource::linked(&base, prescription),
        &location,
    ))
}

pub async fn update_prescription(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    RecordId(id): RecordId,
    ValidJson(payload): ValidJson<PrescriptionUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let prescription = state.storage.update_prescription(id, payload).await?;
    tracing::info!(prescription_id = id, "prescription updated");
    state
        .cache
        .invalidate(keys::prescription_written(&prescription))
        .await;
    Ok(ApiResponse::ok(Resource::linked(&base, prescription)))
}

pub async fn delete_prescription(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    RecordId(id): RecordId,
) -> Result<impl IntoResponse, ApiError> {
    let prescription = state.storage.delete_prescription(id).await?;
    tracing::info!(prescription_id = id, "prescription deleted");
    state
        .cache
        .invalidate(keys::prescription_written(&prescription))
        .await;
    Ok(ApiResponse::ok(Deleted::new(
        &base,
        EntityKind::Prescription,
        format!("Prescription {id} deleted"),
    )))
}
