//! Retry policy and scheduling for failed handlers.
//!
//! A failed event is acknowledged on the stream and re-published later as a
//! fresh entry with `_retries` bumped, so the consumer group's pending list
//! never accumulates poison messages.

use std::time::Duration;

use tracing::{error, warn};

use crate::event::Event;
use crate::jobs::{JobQueue, RequeueJob};

/// When and how often a failed event is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total delivery attempts before the event is dropped
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Cap on the delay between retries
    pub max_delay: Duration,

    /// Double the delay on each subsequent attempt
    pub exponential: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(15 * 60),
            exponential: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            exponential: false,
        }
    }

    /// Delay before the retry that would become attempt number `attempt`
    /// (1-based; attempt 1 is the first retry).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if !self.exponential || attempt <= 1 {
            return self.base_delay.min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Schedules failed events back onto their stream via the job queue.
#[derive(Clone)]
pub struct RetryScheduler {
    jobs: JobQueue,
    stream: String,
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(jobs: JobQueue, stream: impl Into<String>) -> Self {
        Self {
            jobs,
            stream: stream.into(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Schedule the next attempt for a failed event.
    ///
    /// Infallible from the caller's view: scheduling failures are logged and
    /// the event is dropped rather than blocking the consumer loop.
    pub async fn schedule(&self, event: &Event) {
        let attempt = event.retries() + 1;
        let event_type = event.event_type().unwrap_or("<untyped>");

        if attempt >= self.policy.max_attempts {
            error!(
                event_type = %event_type,
                attempts = attempt,
                max_attempts = self.policy.max_attempts,
                "Dropping event after exhausting retries"
            );
            return;
        }

        let delay = self.policy.delay_for_attempt(attempt);
        let job = RequeueJob::new(&self.stream, event.with_retry());

        match self.jobs.enqueue(&job, delay).await {
            Ok(()) => {
                warn!(
                    event_type = %event_type,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduled event retry"
                );
            }
            Err(e) => {
                error!(
                    event_type = %event_type,
                    error = %e,
                    "Failed to schedule retry, dropping event"
                );
            }
        }
    }
}
