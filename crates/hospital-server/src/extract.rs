//! Request extractors shared by the handlers.

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::header::{AsHeaderName, HOST};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use hospital_api::ApiError;
use hospital_auth::AuthContext;
use hospital_storage::{StorageError, Validate};
use serde::de::DeserializeOwned;
use std::convert::Infallible;

use crate::server::AppState;

/// Scheme and authority that links in the response are built on.
///
/// Taken from `X-Forwarded-Proto`/`X-Forwarded-Host`, then `Host`; the
/// configured base URL applies only when the request names no host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl(pub String);

impl BaseUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromRequestParts<AppState> for BaseUrl {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let base = base_url_from_headers(&parts.headers).unwrap_or_else(|| state.config.base_url());
        Ok(Self(base))
    }
}

pub fn base_url_from_headers(headers: &HeaderMap) -> Option<String> {
    let host = first_value(headers, "x-forwarded-host").or_else(|| first_value(headers, HOST))?;
    let proto = first_value(headers, "x-forwarded-proto")
        .filter(|p| p.eq_ignore_ascii_case("http") || p.eq_ignore_ascii_case("https"))
        .unwrap_or("http")
        .to_ascii_lowercase();
    Some(format!("{proto}://{host}"))
}

/// First entry of a possibly comma-separated header.
fn first_value<'a>(headers: &'a HeaderMap, name: impl AsHeaderName) -> Option<&'a str> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// The caller's identity, `None` when authentication is disabled.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<AuthContext>);

impl CurrentUser {
    pub fn user_id(&self) -> Option<i64> {
        self.0.as_ref().map(|ctx| ctx.user_id)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<AuthContext>().cloned()))
    }
}

/// Numeric `{id}` path segment. Anything else names no record, so it is a
/// `404` like any unknown id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for RecordId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<i64>::from_request_parts(parts, state).await {
            Ok(Path(id)) => Ok(Self(id)),
            Err(rejection) => {
                tracing::debug!(path = %parts.uri.path(), error = %rejection.body_text(), "non-numeric record id");
                Err(ApiError::not_found(format!(
                    "No record at {}",
                    parts.uri.path()
                )))
            }
        }
    }
}

/// JSON body whose rejections become `400` API errors.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection.body_text(), "rejected request body");
                Err(ApiError::bad_request(rejection.body_text()))
            }
        }
    }
}

/// [`ApiJson`] that also runs the payload's field validation.
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let ApiJson(value) = ApiJson::<T>::from_request(req, state).await?;
        value
            .validate()
            .map_err(|errors| ApiError::from(StorageError::from(errors)))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn host_header_is_used() {
        let h = headers(&[("host", "api.example.org:5000")]);
        assert_eq!(
            base_url_from_headers(&h).as_deref(),
            Some("http://api.example.org:5000")
        );
    }

    #[test]
    fn forwarded_headers_win() {
        let h = headers(&[
            ("host", "10.0.0.3:5000"),
            ("x-forwarded-host", "records.example.org, proxy.internal"),
            ("x-forwarded-proto", "HTTPS"),
        ]);
        assert_eq!(
            base_url_from_headers(&h).as_deref(),
            Some("https://records.example.org")
        );
    }

    #[test]
    fn unknown_proto_falls_back_to_http() {
        let h = headers(&[("host", "a.example"), ("x-forwarded-proto", "gopher")]);
        assert_eq!(base_url_from_headers(&h).as_deref(), Some("http://a.example"));
    }

    #[test]
    fn no_host_yields_none() {
        assert_eq!(base_url_from_headers(&HeaderMap::new()), None);
    }
}
