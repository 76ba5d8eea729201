//! Stream manager: one connection, many stream channels.

use std::time::Duration;

use redis::aio::ConnectionManager;

use crate::channel::StreamChannel;
use crate::connect;
use crate::error::StreamError;
use crate::event::Event;

/// Owns the Redis connection and hands out [`StreamChannel`]s.
///
/// Also exposes the channel operations directly keyed by stream name,
/// which is what the consumer loop and the job worker use.
#[derive(Clone)]
pub struct StreamManager {
    redis: ConnectionManager,
    max_length: Option<i64>,
}

impl StreamManager {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            max_length: None,
        }
    }

    /// Connect to Redis and build a manager.
    pub async fn connect(url: &str) -> Result<Self, StreamError> {
        Ok(Self::new(connect::connect(url).await?))
    }

    /// Apply `MAXLEN ~` trimming to every append made through this manager.
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// A channel bound to one stream key.
    pub fn channel(&self, stream: &str) -> StreamChannel {
        let channel = StreamChannel::new(self.redis.clone(), stream);
        match self.max_length {
            Some(max_length) => channel.with_max_length(max_length),
            None => channel,
        }
    }

    pub async fn create_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        self.channel(stream).create_group(group).await
    }

    pub async fn add_event(&self, stream: &str, event: &Event) -> Result<String, StreamError> {
        self.channel(stream).add(event).await
    }

    pub async fn read_events(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<(String, Event)>, StreamError> {
        self.channel(stream)
            .read_group(group, consumer, count, block)
            .await
    }

    pub async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<(String, Event)>, StreamError> {
        self.channel(stream).read_pending(group, consumer, count).await
    }

    pub async fn ack_event(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError> {
        self.channel(stream).ack(group, id).await
    }

    pub async fn delete_event(&self, stream: &str, id: &str) -> Result<(), StreamError> {
        self.channel(stream).delete(id).await
    }

    pub async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<usize, StreamError> {
        self.channel(stream)
            .claim_stale(group, consumer, min_idle, count)
            .await
    }

    pub async fn stream_len(&self, stream: &str) -> Result<i64, StreamError> {
        self.channel(stream).len().await
    }

    pub async fn pending_count(&self, stream: &str, group: &str) -> Result<i64, StreamError> {
        self.channel(stream).pending_count(group).await
    }

    /// The underlying connection, for callers that need raw commands.
    pub fn redis(&self) -> ConnectionManager {
        self.redis.clone()
    }
}
