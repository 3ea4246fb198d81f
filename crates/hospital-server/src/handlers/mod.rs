//! HTTP handlers.

pub mod auth;
pub mod patients;
pub mod prescriptions;
pub mod reports;
pub mod visits;

use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::IntoResponse;
use hospital_api::{ApiError, ApiResponse, EntityKind, Link, LinkSet, collection_links};
use hospital_storage::FIELD_RULES;
use serde::Serialize;
use serde_json::json;

use crate::extract::BaseUrl;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

/// Body of a successful delete: a message plus links back to the
/// collection.
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub message: String,
    #[serde(rename = "_links")]
    pub links: LinkSet,
}

impl Deleted {
    pub fn new(base_url: &str, kind: EntityKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            links: collection_links(base_url, kind),
        }
    }
}

pub async fn root(BaseUrl(base): BaseUrl) -> impl IntoResponse {
    let base = base.trim_end_matches('/');
    let links = LinkSet::new()
        .with("self", Link::get(format!("{base}/")))
        .with("login", Link::post(format!("{base}/login")))
        .with("patients", Link::get(format!("{base}/patients")))
        .with("visits", Link::get(format!("{base}/visits")))
        .with("prescriptions", Link::get(format!("{base}/prescriptions")))
        .with("reports", Link::get(format!("{base}/reports")))
        .with(
            "validation-rules",
            Link::get(format!("{base}/docs/validation-rules")),
        );
    ApiResponse::ok(json!({
        "service": "Hospital Records API",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "_links": links,
    }))
}

pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok(HealthResponse { status: "ok" })
}

/// Ready when the storage backend answers.
pub async fn readyz(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.storage.ping().await.map_err(|e| {
        tracing::warn!(error = %e, "readiness check failed");
        ApiError::service_unavailable("Storage backend is unavailable")
    })?;
    Ok(ApiResponse::ok(json!({
        "status": "ready",
        "storage": state.storage.backend_name(),
        "cache": state.cache.backend_name(),
    })))
}

pub async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let body = crate::metrics::render_metrics()
        .ok_or_else(|| ApiError::service_unavailable("Metrics are not initialized"))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

pub async fn validation_rules(BaseUrl(base): BaseUrl) -> impl IntoResponse {
    let base = base.trim_end_matches('/');
    ApiResponse::ok(json!({
        "data": FIELD_RULES,
        "count": FIELD_RULES.len(),
        "_links": LinkSet::new()
            .with("self", Link::get(format!("{base}/docs/validation-rules")))
            .with("home", Link::get(format!("{base}/"))),
    }))
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}
