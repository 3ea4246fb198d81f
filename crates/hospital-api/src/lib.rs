//! API types shared by the hospital server: the error type, the JSON response
//! envelope and the hypermedia link builder.

use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use hospital_storage::StorageError;
use serde::Serialize;
use serde_json::json;

pub mod envelope;
pub mod hateoas;

pub use envelope::{Collection, LinkedItem, Resource};
pub use hateoas::{
    Entity, EntityKind, Link, LinkSet, Linked, collection_links, entity_links, error_links,
};

/// Message returned for every 5xx response; internal details only go to logs.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Client-facing message of an error response, stored in the response
/// extensions so middleware can rebuild the body with links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage(pub String);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Bad gateway: {0}")]
    BadGateway(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn unsupported_media_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(msg.into())
    }
    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self::BadGateway(msg.into())
    }
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to clients. Internal errors are masked.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::UnsupportedMediaType(msg)
            | ApiError::BadGateway(msg)
            | ApiError::ServiceUnavailable(msg) => msg.clone(),
            ApiError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StorageError::InvalidReference { .. } | StorageError::Validation(_) => {
                ApiError::BadRequest(err.to_string())
            }
            StorageError::AlreadyExists { .. } => ApiError::Conflict(err.to_string()),
            StorageError::Connection { .. } => {
                tracing::error!(error = %err, "storage backend unavailable");
                ApiError::ServiceUnavailable("Storage backend is unavailable".to_string())
            }
            StorageError::Internal { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }
        let message = self.public_message();
        let body = json!({ "error": message, "_links": {} });
        let mut response = (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            body.to_string(),
        )
            .into_response();
        response.extensions_mut().insert(ErrorMessage(message));
        if let ApiError::Unauthorized(_) = self {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hospital_storage::ValidationErrors;

    #[test]
    fn into_response_sets_status_and_content_type() {
        let resp = ApiError::bad_request("Invalid parameter").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let content_type = resp.headers().get(header::CONTENT_TYPE).unwrap();
        assert_eq!(content_type, &HeaderValue::from_static("application/json"));
        assert_eq!(
            resp.extensions().get::<ErrorMessage>(),
            Some(&ErrorMessage("Invalid parameter".into()))
        );
    }

    #[test]
    fn internal_errors_are_masked() {
        let resp = ApiError::internal("connection string leaked").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            resp.extensions().get::<ErrorMessage>().unwrap().0,
            INTERNAL_ERROR_MESSAGE
        );
    }

    #[test]
    fn unauthorized_carries_challenge() {
        let resp = ApiError::unauthorized("Missing token").into_response();
        assert_eq!(
            resp.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn storage_errors_map_to_status() {
        let mut errors = ValidationErrors::default();
        errors.push("age", "must be between 0 and 150");
        let cases: Vec<(StorageError, StatusCode)> = vec![
            (StorageError::not_found("patient", 1), StatusCode::NOT_FOUND),
            (
                StorageError::invalid_reference("patient", 1),
                StatusCode::BAD_REQUEST,
            ),
            (StorageError::Validation(errors), StatusCode::BAD_REQUEST),
            (
                StorageError::already_exists("user", "dr_smith"),
                StatusCode::CONFLICT,
            ),
            (
                StorageError::connection("refused"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                StorageError::internal("boom"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }
}

// -------------------------
// API Response Wrapper
// -------------------------

#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub value: T,
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl<T> ApiResponse<T> {
    pub fn new(value: T, status: StatusCode) -> Self {
        Self {
            value,
            status,
            headers: Vec::new(),
        }
    }

    pub fn ok(value: T) -> Self {
        Self::new(value, StatusCode::OK)
    }

    /// 201 with a `Location` header. An unrepresentable location is dropped.
    pub fn created(value: T, location: &str) -> Self {
        let response = Self::new(value, StatusCode::CREATED);
        match HeaderValue::from_str(location) {
            Ok(v) => response.with_header(header::LOCATION, v),
            Err(_) => response,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = match serde_json::to_vec(&self.value) {
            Ok(b) => b,
            Err(e) => {
                return ApiError::internal(format!("response serialization failed: {e}"))
                    .into_response();
            }
        };
        let mut response = (
            self.status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            body,
        )
            .into_response();
        for (name, value) in self.headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn api_response_ok_sets_status_and_content_type() {
        let resp = ApiResponse::ok(json!({"data": []})).into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            &HeaderValue::from_static("application/json")
        );
    }

    #[test]
    fn created_sets_location() {
        let resp = ApiResponse::created(json!({}), "http://localhost/patients/7").into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "http://localhost/patients/7"
        );
    }

    #[test]
    fn api_response_can_add_headers() {
        let resp = ApiResponse::ok(json!({}))
            .with_header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))
            .into_response();
        assert_eq!(
            resp.headers().get(header::CACHE_CONTROL).unwrap(),
            &HeaderValue::from_static("no-store")
        );
    }
}
