//! Low-level operations on a single Redis Stream.

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use tracing::{debug, trace};

use crate::error::StreamError;
use crate::event::Event;

/// A handle to one stream key, wrapping the raw Redis commands.
///
/// Cheap to clone; the underlying `ConnectionManager` multiplexes.
#[derive(Clone)]
pub struct StreamChannel {
    redis: ConnectionManager,
    stream: String,
    max_length: Option<i64>,
}

impl StreamChannel {
    pub fn new(redis: ConnectionManager, stream: impl Into<String>) -> Self {
        Self {
            redis,
            stream: stream.into(),
            max_length: None,
        }
    }

    /// Trim the stream to roughly this many entries on each append
    /// (`MAXLEN ~`). Off by default.
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    /// Create the consumer group at the start of the stream, creating the
    /// stream itself if needed. An already existing group is fine.
    pub async fn create_group(&self, group: &str) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();

        let result: Result<String, redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                debug!(stream = %self.stream, group = %group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                trace!(stream = %self.stream, group = %group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Append an event, returning the generated entry ID.
    pub async fn add(&self, event: &Event) -> Result<String, StreamError> {
        let mut conn = self.redis.clone();

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream);
        if let Some(max_length) = self.max_length {
            cmd.arg("MAXLEN").arg("~").arg(max_length);
        }
        cmd.arg("*");
        for (key, value) in event.fields() {
            cmd.arg(key).arg(value);
        }

        let id: String = cmd.query_async(&mut conn).await?;
        trace!(stream = %self.stream, entry_id = %id, "Appended event");
        Ok(id)
    }

    /// Read new entries for this group (`XREADGROUP ... >`).
    ///
    /// A blocking read that times out with nothing to deliver returns an
    /// empty batch, not an error.
    pub async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<(String, Event)>, StreamError> {
        self.read_from(group, consumer, count, block, ">").await
    }

    /// Read this consumer's own pending entries (`XREADGROUP ... 0`).
    pub async fn read_pending(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<(String, Event)>, StreamError> {
        self.read_from(group, consumer, count, None, "0").await
    }

    async fn read_from(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
        block: Option<Duration>,
        id: &str,
    ) -> Result<Vec<(String, Event)>, StreamError> {
        let mut conn = self.redis.clone();

        let mut options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count);
        if let Some(block) = block {
            options = options.block(block.as_millis() as usize);
        }

        let reply: Result<StreamReadReply, redis::RedisError> = conn
            .xread_options(&[&self.stream], &[id], &options)
            .await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                let msg = e.to_string().to_lowercase();
                if msg.contains("timed out") || msg.contains("timeout") {
                    return Ok(Vec::new());
                }
                return Err(e.into());
            }
        };

        let mut entries = Vec::new();
        for key in reply.keys {
            for stream_id in key.ids {
                entries.push((stream_id.id.clone(), Event::from_entry(&stream_id.map)));
            }
        }
        Ok(entries)
    }

    /// Acknowledge an entry for the group.
    pub async fn ack(&self, group: &str, id: &str) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();
        let _: i64 = conn.xack(&self.stream, group, &[id]).await?;
        Ok(())
    }

    /// Delete an entry from the stream.
    pub async fn delete(&self, id: &str) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();
        let _: i64 = conn.xdel(&self.stream, &[id]).await?;
        Ok(())
    }

    /// Claim entries idle longer than `min_idle` onto this consumer
    /// (`XAUTOCLAIM`). Returns how many entries were claimed; the caller
    /// picks them up through [`read_pending`](Self::read_pending).
    pub async fn claim_stale(
        &self,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<usize, StreamError> {
        let mut conn = self.redis.clone();

        let reply: redis::Value = redis::cmd("XAUTOCLAIM")
            .arg(&self.stream)
            .arg(group)
            .arg(consumer)
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        // Reply: [next-cursor, [[id, fields]...], [deleted-ids...]]
        let claimed = match &reply {
            redis::Value::Array(items) if items.len() >= 2 => match &items[1] {
                redis::Value::Array(entries) => entries.len(),
                _ => 0,
            },
            _ => 0,
        };

        if claimed > 0 {
            debug!(
                stream = %self.stream,
                group = %group,
                consumer = %consumer,
                claimed,
                "Claimed stale pending entries"
            );
        }
        Ok(claimed)
    }

    /// Number of entries in the stream.
    pub async fn len(&self) -> Result<i64, StreamError> {
        let mut conn = self.redis.clone();
        Ok(conn.xlen(&self.stream).await?)
    }

    /// Number of entries pending (delivered but unacknowledged) for a group.
    pub async fn pending_count(&self, group: &str) -> Result<i64, StreamError> {
        let mut conn = self.redis.clone();

        type PendingSummary = (i64, Option<String>, Option<String>, Option<Vec<(String, i64)>>);
        let summary: PendingSummary = redis::cmd("XPENDING")
            .arg(&self.stream)
            .arg(group)
            .query_async(&mut conn)
            .await?;

        Ok(summary.0)
    }
}
