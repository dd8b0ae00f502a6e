/// Error types for the backend boundary
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Non-success response from the service
    #[error("Backend responded {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BackendError {
    /// Map a response status and body onto the closest variant
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => BackendError::Unauthorized(message),
            404 => BackendError::NotFound(message),
            409 => BackendError::Conflict(message),
            400 => BackendError::InvalidInput(message),
            _ => BackendError::Api { status, message },
        }
    }
}

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
