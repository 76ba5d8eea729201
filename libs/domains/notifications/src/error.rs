//! Error types for the notifications domain.

use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Event payload is missing a required field or fails to parse.
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    /// Outbox cache lookup or storage error.
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Delivery to the admin channel failed.
    #[error("Notifier error: {0}")]
    NotifierError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for NotificationError {
    fn from(err: redis::RedisError) -> Self {
        NotificationError::CacheError(err.to_string())
    }
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        NotificationError::NotifierError(err.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl From<NotificationError> for event_stream::StreamError {
    fn from(err: NotificationError) -> Self {
        event_stream::StreamError::Handler(err.to_string())
    }
}
