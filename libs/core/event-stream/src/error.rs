//! Error types for the event-stream backbone.

use thiserror::Error;

/// Errors surfaced by the stream layer and by event handlers.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A registered handler rejected the event
    #[error("Handler error: {0}")]
    Handler(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Create a handler-level failure.
    pub fn handler(message: impl Into<String>) -> Self {
        StreamError::Handler(message.into())
    }

    /// Whether this looks like a transport-level connection failure.
    ///
    /// Used by the consumer loop to decide between a quiet retry and a
    /// louder error log; classification is best effort.
    pub fn is_connection_error(&self) -> bool {
        match self {
            StreamError::Redis(e) => {
                let lower = e.to_string().to_lowercase();
                lower.contains("connection")
                    || lower.contains("disconnected")
                    || lower.contains("broken pipe")
                    || lower.contains("reset by peer")
                    || lower.contains("refused")
                    || lower.contains("timed out")
                    || lower.contains("io error")
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}
