//! Authentication error types.

use hospital_api::ApiError;
use hospital_storage::StorageError;

use crate::token::JwtError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown username or wrong password. Deliberately does not say which.
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] JwtError),

    /// The token is valid but its subject no longer exists.
    #[error("Unknown user")]
    UnknownUser,

    #[error("Password hashing failed: {message}")]
    PasswordHash { message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AuthError {
    #[must_use]
    pub fn password_hash(message: impl Into<String>) -> Self {
        Self::PasswordHash {
            message: message.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::InvalidToken(_)
            | AuthError::UnknownUser => ApiError::unauthorized(err.to_string()),
            AuthError::PasswordHash { .. } => ApiError::internal(err.to_string()),
            AuthError::Storage(e) => ApiError::from(e),
        }
    }
}
