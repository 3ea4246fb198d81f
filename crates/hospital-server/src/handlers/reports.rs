use axum::extract::{Query, State};
use axum::response::IntoResponse;
use hospital_api::{ApiError, ApiResponse, Collection, EntityKind, Resource};
use hospital_storage::{NewReport, ReportFilter, ReportUpdate, StorageError};
use serde::Deserialize;

use super::Deleted;
use crate::cache::keys;
use crate::extract::{BaseUrl, RecordId, ValidJson};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub patient: Option<i64>,
}

pub async fn list_reports(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = ReportFilter {
        patient_id: query.patient,
    };
    let reports = state
        .cache
        .get_or_compute(&keys::report_list(query.patient), None, || {
            state.storage.list_reports(filter)
        })
        .await?;
    Ok(ApiResponse::ok(Collection::linked(
        &base,
        EntityKind::Report,
        reports,
    )))
}

pub async fn get_report(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    RecordId(id): RecordId,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .cache
        .get_or_compute(&keys::report(id), None, || async {
            state
                .storage
                .get_report(id)
                .await?
                .ok_or_else(|| StorageError::not_found("report", id))
        })
        .await?;
    Ok(ApiResponse::ok(Resource::linked(&base, report)))
}

pub async fn create_report(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    ValidJson(payload): ValidJson<NewReport>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.storage.create_report(payload).await?;
    tracing::info!(
        report_id = report.id,
        patient_id = report.patient_id,
        report_type = %report.report_type,
        "report created"
    );
    state.cache.invalidate(keys::report_written(&report)).await;

    let location = format!(
        "{}{}",
        base.trim_end_matches('/'),
        EntityKind::Report.item_path(report.id)
    );
    Ok(ApiResponse::created(Resource::linked(&base, report), &location))
}

pub async fn update_report(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    RecordId(id): RecordId,
    ValidJson(payload): ValidJson<ReportUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.storage.update_report(id, payload).await?;
    tracing::info!(report_id = id, "report updated");
    state.cache.invalidate(keys::report_written(&report)).await;
    Ok(ApiResponse::ok(Resource::linked(&base, report)))
}

pub async fn delete_report(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    RecordId(id): RecordId,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.storage.delete_report(id).await?;
    tracing::info!(report_id = id, "report deleted");
    state.cache.invalidate(keys::report_written(&report)).await;
    Ok(ApiResponse::ok(Deleted::new(
        &base,
        EntityKind::Report,
        format!("Report {id} deleted"),
    )))
}
