//! Deferred job queue backed by a Redis sorted set.
//!
//! Retried events are not re-read through the consumer group's pending
//! list; they are parked here with a due time and re-appended to the
//! stream by [`JobQueueWorker`] once the delay elapses. The sorted-set
//! score is the due time in epoch milliseconds, and `ZREM` doubles as an
//! atomic claim so concurrent workers never run the same job twice.

use std::time::Duration;

use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::StreamError;
use crate::event::Event;
use crate::manager::StreamManager;

/// Default sorted-set key for scheduled jobs.
pub const DEFAULT_JOBS_KEY: &str = "jobs:scheduled";

/// A deferred re-publish of one event onto its stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequeueJob {
    pub id: String,
    pub stream: String,
    pub event: Event,
}

impl RequeueJob {
    pub fn new(stream: impl Into<String>, event: Event) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            stream: stream.into(),
            event,
        }
    }
}

/// Sorted-set-backed delay queue.
#[derive(Clone)]
pub struct JobQueue {
    redis: redis::aio::ConnectionManager,
    key: String,
}

impl JobQueue {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self {
            redis,
            key: DEFAULT_JOBS_KEY.to_string(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Schedule a job to run after `delay`.
    pub async fn enqueue(&self, job: &RequeueJob, delay: Duration) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();

        let due_ms = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let member = serde_json::to_string(job)?;

        let _: i64 = conn.zadd(&self.key, member, due_ms).await?;
        debug!(job_id = %job.id, stream = %job.stream, due_ms, "Enqueued requeue job");
        Ok(())
    }

    /// Members whose due time has passed, oldest first.
    pub async fn due_jobs(&self, now_ms: i64, limit: usize) -> Result<Vec<String>, StreamError> {
        let mut conn = self.redis.clone();

        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.key)
            .arg("-inf")
            .arg(now_ms)
            .arg("LIMIT")
            .arg(0)
            .arg(limit)
            .query_async(&mut conn)
            .await?;

        Ok(members)
    }

    /// Atomically claim a member. Returns false if another worker got it.
    pub async fn claim(&self, member: &str) -> Result<bool, StreamError> {
        let mut conn = self.redis.clone();
        let removed: i64 = conn.zrem(&self.key, member).await?;
        Ok(removed == 1)
    }

    pub async fn len(&self) -> Result<i64, StreamError> {
        let mut conn = self.redis.clone();
        Ok(conn.zcard(&self.key).await?)
    }
}

/// Polls the job queue and re-appends due events to their streams.
pub struct JobQueueWorker {
    queue: JobQueue,
    manager: StreamManager,
    poll_interval: Duration,
    batch_size: usize,
}

impl JobQueueWorker {
    pub fn new(queue: JobQueue, manager: StreamManager) -> Self {
        Self {
            queue,
            manager,
            poll_interval: Duration::from_secs(1),
            batch_size: 50,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run until the shutdown flag flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "Job queue worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.drain_due().await {
                error!(error = %e, "Job queue poll failed");
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Job queue worker stopped");
    }

    /// Claim and execute every due job.
    async fn drain_due(&self) -> Result<(), StreamError> {
        let now_ms = Utc::now().timestamp_millis();
        let members = self.queue.due_jobs(now_ms, self.batch_size).await?;

        for member in members {
            if !self.queue.claim(&member).await? {
                continue;
            }

            let job: RequeueJob = match serde_json::from_str(&member) {
                Ok(job) => job,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed requeue job");
                    continue;
                }
            };

            match self.manager.add_event(&job.stream, &job.event).await {
                Ok(entry_id) => {
                    debug!(
                        job_id = %job.id,
                        stream = %job.stream,
                        entry_id = %entry_id,
                        retries = job.event.retries(),
                        "Requeued event"
                    );
                }
                Err(e) => {
                    // One more chance shortly; if that enqueue also fails
                    // the job is lost and we say so.
                    error!(job_id = %job.id, stream = %job.stream, error = %e, "Requeue failed");
                    if let Err(e) = self.queue.enqueue(&job, Duration::from_secs(5)).await {
                        error!(job_id = %job.id, error = %e, "Dropping requeue job after re-enqueue failure");
                    }
                }
            }
        }

        Ok(())
    }
}
