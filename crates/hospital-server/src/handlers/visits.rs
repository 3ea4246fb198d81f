use axum::extract::{Query, State};
use axum::response::IntoResponse;
use hospital_api::{ApiError, ApiResponse, Collection, EntityKind, Resource};
use hospital_storage::{NewVisit, StorageError, VisitFilter, VisitUpdate};
use serde::Deserialize;

use super::Deleted;
use crate::cache::keys;
use crate::extract::{BaseUrl, CurrentUser, RecordId, ValidJson};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct VisitQuery {
    pub patient: Option<i64>,
}

pub async fn list_visits(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    Query(query): Query<VisitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = VisitFilter {
        patient_id: query.patient,
    };
    let visits = state
        .cache
        .get_or_compute(&keys::visit_list(query.patient), None, || {
            state.storage.list_visits(filter)
        })
        .await?;
    Ok(ApiResponse::ok(Collection::linked(
        &base,
        EntityKind::Visit,
        visits,
    )))
}

pub async fn get_visit(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    RecordId(id): RecordId,
) -> Result<impl IntoResponse, ApiError> {
    let visit = state
        .cache
        .get_or_compute(&keys::visit(id), None, || async {
            state
                .storage
                .get_visit(id)
                .await?
                .ok_or_else(|| StorageError::not_found("visit", id))
        })
        .await?;
    Ok(ApiResponse::ok(Resource::linked(&base, visit)))
}

/// `doctor_id` defaults to the caller.
pub async fn create_visit(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    user: CurrentUser,
    ValidJson(mut payload): ValidJson<NewVisit>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.doctor_id.is_none() {
        payload.doctor_id = user.user_id();
    }
    let visit = state.storage.create_visit(payload).await?;
    tracing::info!(
        visit_id = visit.id,
        patient_id = visit.patient_id,
        doctor_id = visit.doctor_id,
        "visit created"
    );
    state.cache.invalidate(keys::visit_written(&visit)).await;

    let location = format!(
        "{}{}",
        base.trim_end_matches('/'),
        EntityKind::Visit.item_path(visit.id)
    );
    Ok(ApiResponse::created(Resource::linked(&base, visit), &location))
}

pub async fn update_visit(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    RecordId(id): RecordId,
    ValidJson(payload): ValidJson<VisitUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let visit = state.storage.update_visit(id, payload).await?;
    tracing::info!(visit_id = id, "visit updated");
    state.cache.invalidate(keys::visit_written(&visit)).await;
    Ok(ApiResponse::ok(Resource::linked(&base, visit)))
}

/// Prescriptions written during the visit are kept and detached.
pub async fn delete_visit(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    RecordId(id): RecordId,
) -> Result<impl IntoResponse, ApiError> {
    let removal = state.storage.delete_visit(id).await?;
    tracing::info!(
        visit_id = id,
        detached_prescriptions = removal.detached_prescription_ids.len(),
        "visit deleted"
    );
    state.cache.invalidate(keys::visit_removed(&removal)).await;
    Ok(ApiResponse::ok(Deleted::new(
        &base,
        EntityKind::Visit,
        format!("Visit {id} deleted"),
    )))
}
