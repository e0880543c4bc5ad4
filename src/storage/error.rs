use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error(
        "Key '{key}' is invalid. Keys must contain only alphanumeric characters or one of : - _ = . * , @ # and must not consist of dots alone."
    )]
    InvalidKey { key: String },

    #[error("{0}")]
    InvalidPayload(String),

    #[error("Version mismatch for key '{key}'. Expected {expected}, actual {actual}.")]
    VersionMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("Key '{key}' was not found.")]
    NotFound { key: String },

    #[error("The operation was cancelled before it could acquire the key lock.")]
    Cancelled,
}

impl StoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::InvalidKey { .. } | StoreError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            StoreError::VersionMismatch { .. } => StatusCode::CONFLICT,
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}
