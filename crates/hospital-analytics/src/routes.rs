use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::client::ApiClient;
use crate::error::AnalyticsError;
use crate::stats::{
    self, DoctorWorkload, PatientRow, PatientStats, PrescriptionAnalysis, PrescriptionRow,
    VisitRow, VisitTrends,
};

pub const DEFAULT_TREND_DAYS: u32 = 30;

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<ApiClient>,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/analytics/patient-stats", get(patient_stats))
        .route("/analytics/visit-trends", get(visit_trends))
        .route("/analytics/prescription-analysis", get(prescription_analysis))
        .route("/analytics/doctor-workload", get(doctor_workload))
        .route("/healthz", get(healthz))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("No route for {}", uri.path()) })),
    )
}

async fn patient_stats(
    State(state): State<AppState>,
) -> Result<Json<PatientStats>, AnalyticsError> {
    let patients: Vec<PatientRow> = state.client.fetch_collection("patients").await?;
    Ok(Json(stats::patient_stats(&patients)))
}

#[derive(Debug, Deserialize)]
pub struct TrendParams {
    pub days: Option<String>,
}

impl TrendParams {
    /// Missing means the default window; anything but a positive integer is
    /// rejected.
    pub fn days(&self) -> Result<u32, AnalyticsError> {
        let Some(raw) = self.days.as_deref() else {
            return Ok(DEFAULT_TREND_DAYS);
        };
        match raw.trim().parse::<i64>() {
            Ok(days) if days > 0 => u32::try_from(days)
                .map_err(|_| AnalyticsError::invalid_query("Days parameter is too large")),
            Ok(_) => Err(AnalyticsError::invalid_query(
                "Days parameter must be a positive number",
            )),
            Err(_) => Err(AnalyticsError::invalid_query(
                "Days parameter must be an integer",
            )),
        }
    }
}

async fn visit_trends(
    State(state): State<AppState>,
    Query(params): Query<TrendParams>,
) -> Result<Json<VisitTrends>, AnalyticsError> {
    let days = params.days()?;
    let visits: Vec<VisitRow> = state.client.fetch_collection("visits").await?;
    Ok(Json(stats::visit_trends(&visits, days)))
}

async fn prescription_analysis(
    State(state): State<AppState>,
) -> Result<Json<PrescriptionAnalysis>, AnalyticsError> {
    let prescriptions: Vec<PrescriptionRow> =
        state.client.fetch_collection("prescriptions").await?;
    Ok(Json(stats::prescription_analysis(&prescriptions)))
}

async fn doctor_workload(
    State(state): State<AppState>,
) -> Result<Json<DoctorWorkload>, AnalyticsError> {
    let visits: Vec<VisitRow> = state.client.fetch_collection("visits").await?;
    let prescriptions = match state
        .client
        .fetch_collection::<PrescriptionRow>("prescriptions")
        .await
    {
        Ok(rows) => Some(rows),
        Err(e) => {
            tracing::warn!(error = %e, "prescriptions unavailable, reporting visits only");
            None
        }
    };
    Ok(Json(stats::doctor_workload(&visits, prescriptions.as_deref())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(days: Option<&str>) -> TrendParams {
        TrendParams {
            days: days.map(str::to_string),
        }
    }

    #[test]
    fn trend_days_default_and_validation() {
        assert_eq!(params(None).days().unwrap(), DEFAULT_TREND_DAYS);
        assert_eq!(params(Some("7")).days().unwrap(), 7);
        assert!(matches!(
            params(Some("0")).days(),
            Err(AnalyticsError::InvalidQuery(_))
        ));
        assert!(matches!(
            params(Some("-3")).days(),
            Err(AnalyticsError::InvalidQuery(_))
        ));
        assert!(matches!(
            params(Some("week")).days(),
            Err(AnalyticsError::InvalidQuery(_))
        ));
    }
}
