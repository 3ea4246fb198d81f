//! Storage error types.

use crate::validation::ValidationErrors;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record was not found.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind, e.g. `patient`.
        kind: &'static str,
        /// The missing identifier.
        id: i64,
    },

    /// A record references another record that does not exist.
    #[error("referenced {kind} {id} does not exist")]
    InvalidReference {
        /// Kind of the referenced record.
        kind: &'static str,
        /// The dangling identifier.
        id: i64,
    },

    /// A unique constraint was violated.
    #[error("{kind} '{key}' already exists")]
    AlreadyExists {
        /// Record kind, e.g. `user`.
        kind: &'static str,
        /// The conflicting unique value.
        key: String,
    },

    /// The payload failed validation.
    #[error("{0}")]
    Validation(ValidationErrors),

    /// Failed to reach the storage backend.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }

    /// Creates a new `InvalidReference` error.
    #[must_use]
    pub fn invalid_reference(kind: &'static str, id: i64) -> Self {
        Self::InvalidReference { kind, id }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(kind: &'static str, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            key: key.into(),
        }
    }

    /// Creates a validation error for a single field.
    #[must_use]
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::default();
        errors.push(field, message);
        Self::Validation(errors)
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this error describes a bad client payload rather
    /// than a backend failure.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::InvalidReference { .. }
                | Self::AlreadyExists { .. }
                | Self::Validation(_)
        )
    }
}

impl From<ValidationErrors> for StorageError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}
