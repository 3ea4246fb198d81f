use axum::extract::State;
use axum::response::IntoResponse;
use hospital_api::{ApiError, ApiResponse, Link, LinkSet};
use hospital_auth::AuthError;
use hospital_storage::{StorageError, User};
use serde::{Deserialize, Serialize};

use crate::extract::{ApiJson, BaseUrl, CurrentUser};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub user: User,
    #[serde(rename = "_links")]
    pub links: LinkSet,
}

fn session_links(base: &str) -> LinkSet {
    let base = base.trim_end_matches('/');
    LinkSet::new()
        .with("me", Link::get(format!("{base}/me")))
        .with("logout", Link::post(format!("{base}/logout")))
        .with("patients", Link::get(format!("{base}/patients")))
}

pub async fn login(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.username.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }
    let result = state
        .auth
        .login(request.username.trim(), &request.password)
        .await?;
    Ok(ApiResponse::ok(LoginResponse {
        access_token: result.access_token,
        token_type: "Bearer",
        expires_in: result.expires_in,
        user: result.user,
        links: session_links(&base),
    }))
}

/// Tokens are stateless, so logging out only tells the client to discard
/// its token.
pub async fn logout(BaseUrl(base): BaseUrl, user: CurrentUser) -> impl IntoResponse {
    if let Some(ctx) = &user.0 {
        tracing::info!(user_id = ctx.user_id, username = %ctx.username, "logout");
    }
    let base = base.trim_end_matches('/');
    ApiResponse::ok(serde_json::json!({
        "message": "Logged out",
        "_links": LinkSet::new().with("login", Link::post(format!("{base}/login"))),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    BaseUrl(base): BaseUrl,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = user.0.ok_or(AuthError::MissingToken)?;
    let account = state
        .storage
        .get_user(ctx.user_id)
        .await?
        .ok_or_else(|| StorageError::not_found("user", ctx.user_id))?;
    Ok(ApiResponse::ok(serde_json::json!({
        "data": account,
        "_links": session_links(&base),
    })))
}
