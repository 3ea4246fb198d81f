use axum::body::{Body, to_bytes};
use axum::extract::{MatchedPath, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hospital_api::{ApiError, ErrorMessage, INTERNAL_ERROR_MESSAGE, error_links};
use hospital_auth::AuthError;
use std::time::Instant;
use uuid::Uuid;

use crate::server::AppState;

/// Largest non-JSON error body read back to recover its message.
const ERROR_BODY_LIMIT: usize = 16 * 1024;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Requires a valid bearer token and stores the caller's `AuthContext` in
/// request extensions. Installed only on protected routes.
pub async fn authentication_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if !state.config.auth.enabled {
        return next.run(req).await;
    }

    let token = match bearer_token(&req) {
        Some(token) => token.to_owned(),
        None => {
            tracing::debug!(path = %req.uri().path(), "missing or malformed Authorization header");
            return ApiError::from(AuthError::MissingToken).into_response();
        }
    };

    match state.auth.authenticate(&token) {
        Ok(ctx) => {
            tracing::debug!(user_id = ctx.user_id, username = %ctx.username, "token validated");
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "token validation failed");
            ApiError::from(e).into_response()
        }
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Keeps an incoming `x-request-id` or generates one, and echoes it on the
/// response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let req_id_value = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    let Some(req_id_value) = req_id_value else {
        return next.run(req).await;
    };
    req.extensions_mut().insert(req_id_value.clone());
    let mut res = next.run(req).await;
    res.headers_mut()
        .insert(REQUEST_ID_HEADER, req_id_value);
    res
}

pub async fn track_metrics(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let response = next.run(req).await;
    crate::metrics::record_http_request(
        method.as_str(),
        &path,
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

/// Rewrites every 4xx/5xx response into `{"error": ..., "_links": ...}` with
/// the recovery links for its status.
///
/// The message comes from the `ErrorMessage` extension set by `ApiError`.
/// Other error responses (routing, extractor rejections, panics) keep their
/// plain-text body as the message; 5xx bodies are never exposed.
pub async fn hypermedia_errors(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();
    let method: Method = req.method().clone();
    let response = next.run(req).await;

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let message = match parts.extensions.get::<ErrorMessage>() {
        Some(ErrorMessage(message)) => message.clone(),
        None if status.is_server_error() => INTERNAL_ERROR_MESSAGE.to_string(),
        None => {
            let bytes = to_bytes(body, ERROR_BODY_LIMIT).await.unwrap_or_default();
            let text = String::from_utf8_lossy(&bytes).trim().to_string();
            if text.is_empty() {
                status.canonical_reason().unwrap_or("Error").to_string()
            } else {
                text
            }
        }
    };

    let envelope = serde_json::json!({
        "error": message,
        "_links": error_links(&path, &method, status),
    });
    parts.headers.remove(CONTENT_LENGTH);
    parts
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Response::from_parts(parts, Body::from(envelope.to_string()))
}
