//! HTTP client for the hospital records API.
//!
//! Collections come back as `{"data": [...], "count": n, "_links": {...}}`;
//! only `data` is read. With a static `api.token` every request carries it
//! as is. With `api.username`/`api.password` the client logs in lazily, keeps
//! the issued token and logs in again once when a request comes back 401.

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ApiConfig;
use crate::error::AnalyticsError;

#[derive(Debug, Clone)]
enum Credentials {
    Token(String),
    Login { username: String, password: String },
}

#[derive(Deserialize)]
struct CollectionEnvelope<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
}

#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    session: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, AnalyticsError> {
        let credentials = match (&config.token, &config.username, &config.password) {
            (Some(token), _, _) if !token.is_empty() => Credentials::Token(token.clone()),
            (_, Some(username), Some(password)) => Credentials::Login {
                username: username.clone(),
                password: password.clone(),
            },
            _ => {
                return Err(AnalyticsError::Login(
                    "no api.token or api.username/api.password configured".into(),
                ));
            }
        };
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            session: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Fetches the `data` array of a collection endpoint such as `patients`.
    pub async fn fetch_collection<T: DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<Vec<T>, AnalyticsError> {
        let token = self.token().await?;
        let mut response = self.get(endpoint, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED
            && matches!(self.credentials, Credentials::Login { .. })
        {
            debug!(endpoint, "token rejected, logging in again");
            self.session.write().await.take();
            let token = self.token().await?;
            response = self.get(endpoint, &token).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(AnalyticsError::Upstream {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let envelope: CollectionEnvelope<T> =
            serde_json::from_slice(&body).map_err(|e| AnalyticsError::Decode {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
        debug!(endpoint, count = envelope.data.len(), "fetched collection");
        Ok(envelope.data)
    }

    async fn get(&self, endpoint: &str, token: &str) -> Result<reqwest::Response, AnalyticsError> {
        Ok(self
            .http
            .get(self.url(endpoint))
            .bearer_auth(token)
            .send()
            .await?)
    }

    async fn token(&self) -> Result<String, AnalyticsError> {
        let (username, password) = match &self.credentials {
            Credentials::Token(token) => return Ok(token.clone()),
            Credentials::Login { username, password } => (username, password),
        };

        if let Some(token) = self.session.read().await.as_ref() {
            return Ok(token.clone());
        }

        let mut session = self.session.write().await;
        // Another request may have logged in while we waited for the lock.
        if let Some(token) = session.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login(username, password).await?;
        *session = Some(token.clone());
        Ok(token)
    }

    async fn login(&self, username: &str, password: &str) -> Result<String, AnalyticsError> {
        let response = self
            .http
            .post(self.url("login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AnalyticsError::Login(format!(
                "records API answered {}",
                status.as_u16()
            )));
        }
        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| AnalyticsError::Login(e.to_string()))?;
        info!(username, "logged in to the records API");
        Ok(body.access_token)
    }
}
