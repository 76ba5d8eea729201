//! Producer-side API: build an event and append it to the stream.

use thiserror::Error;
use tracing::{debug, error};

use crate::error::StreamError;
use crate::event::Event;
use crate::manager::StreamManager;
use crate::resilience::{RetryConfig, retry_with_backoff};

/// Publishing failed after exhausting transport retries.
#[derive(Error, Debug)]
#[error("failed to publish '{event_type}' to stream '{stream}'")]
pub struct PublishError {
    pub stream: String,
    pub event_type: String,
    #[source]
    pub source: StreamError,
}

/// Publishes typed events onto one stream.
#[derive(Clone)]
pub struct EventPublisher {
    manager: StreamManager,
    stream: String,
    retry: RetryConfig,
}

impl EventPublisher {
    pub fn new(manager: StreamManager, stream: impl Into<String>) -> Self {
        Self {
            manager,
            stream: stream.into(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    /// Append an event of the given type, with extra payload fields.
    ///
    /// Transient transport errors are retried with backoff before giving up.
    pub async fn publish<I, K, V>(
        &self,
        event_type: &str,
        payload: I,
    ) -> Result<String, PublishError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut event = Event::new(event_type);
        for (key, value) in payload {
            event.set(key, value);
        }
        self.publish_event(&event).await
    }

    /// Append a pre-built event.
    pub async fn publish_event(&self, event: &Event) -> Result<String, PublishError> {
        let event_type = event.event_type().unwrap_or("<untyped>").to_string();

        let result = retry_with_backoff(
            || self.manager.add_event(&self.stream, event),
            self.retry.clone(),
        )
        .await;

        match result {
            Ok(id) => {
                debug!(
                    stream = %self.stream,
                    event_type = %event_type,
                    entry_id = %id,
                    "Published event"
                );
                Ok(id)
            }
            Err(source) => {
                error!(
                    stream = %self.stream,
                    event_type = %event_type,
                    error = %source,
                    "Failed to publish event"
                );
                Err(PublishError {
                    stream: self.stream.clone(),
                    event_type,
                    source,
                })
            }
        }
    }
}
