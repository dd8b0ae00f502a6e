//! Error types for cache invalidation operations

use thiserror::Error;

/// Cache invalidation errors
#[derive(Error, Debug)]
pub enum InvalidationError {
    /// Message serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Subscriber fell behind and missed messages
    #[error("Subscriber lagged, skipped {0} messages")]
    Lagged(u64),

    /// Every publisher has been dropped
    #[error("Invalidation channel closed")]
    Closed,

    /// Callback execution failed
    #[error("Callback execution failed: {0}")]
    CallbackFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InvalidationError::Closed;
        assert_eq!(err.to_string(), "Invalidation channel closed");

        let err = InvalidationError::Lagged(3);
        assert_eq!(err.to_string(), "Subscriber lagged, skipped 3 messages");
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<String>("invalid json");
        assert!(json_err.is_err());

        let err: InvalidationError = json_err.unwrap_err().into();
        assert!(matches!(err, InvalidationError::Serialization(_)));
    }
}
