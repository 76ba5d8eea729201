//! Consumer loop configuration.

use std::time::Duration;
use uuid::Uuid;

/// Settings for a [`StreamListener`](crate::consumer::StreamListener).
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Stream key to consume from
    pub stream_name: String,

    /// Consumer group name
    pub group_name: String,

    /// This consumer's name within the group
    pub consumer_name: String,

    /// Max entries fetched per XREADGROUP call
    pub batch_size: usize,

    /// How long a read blocks waiting for new entries
    pub block_timeout: Duration,

    /// Pause after a transport error before the next read
    pub error_backoff: Duration,

    /// Reclaim entries pending on dead consumers after this idle time.
    /// `None` disables the sweep.
    pub claim_idle: Option<Duration>,
}

impl ConsumerConfig {
    pub fn new(stream_name: impl Into<String>, group_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            group_name: group_name.into(),
            consumer_name: default_consumer_name(),
            batch_size: 10,
            block_timeout: Duration::from_secs(5),
            error_backoff: Duration::from_secs(5),
            claim_idle: Some(Duration::from_secs(60)),
        }
    }

    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn with_claim_idle(mut self, idle: Option<Duration>) -> Self {
        self.claim_idle = idle;
        self
    }
}

/// Hostname plus a short random suffix, so restarted pods do not
/// collide with their own stale pending entries.
fn default_consumer_name() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "consumer".to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{host}-{}", &suffix[..8])
}
