use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("Failed to fetch data: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned status {status} for {endpoint}")]
    Upstream { endpoint: String, status: u16 },

    #[error("Failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Login to the records API failed: {0}")]
    Login(String),

    #[error("{0}")]
    InvalidQuery(String),
}

impl AnalyticsError {
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::Request(_) | Self::Upstream { .. } | Self::Decode { .. } | Self::Login(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

impl IntoResponse for AnalyticsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "analytics request failed");
        } else {
            tracing::debug!(error = %self, "rejected analytics request");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
