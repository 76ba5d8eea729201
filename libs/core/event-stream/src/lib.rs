//! Redis Streams event-delivery backbone.
//!
//! Producers append flat string-field events with [`EventPublisher`]; a
//! [`StreamListener`] reads them through a consumer group and dispatches by
//! the `type` field to handlers registered on a [`Router`]. Delivery is
//! at-least-once: every entry is acknowledged after dispatch, and failed
//! handlers get the event re-published later by the [`JobQueueWorker`] with
//! an incremented `_retries` counter.

pub mod channel;
pub mod config;
pub mod connect;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod jobs;
pub mod manager;
pub mod publisher;
pub mod resilience;
pub mod retry;
pub mod router;

pub use channel::StreamChannel;
pub use config::ConsumerConfig;
pub use connect::{connect, connect_with_retry};
pub use consumer::StreamListener;
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::StreamError;
pub use event::{Event, RETRIES_FIELD, TYPE_FIELD};
pub use jobs::{JobQueue, JobQueueWorker, RequeueJob};
pub use manager::StreamManager;
pub use publisher::{EventPublisher, PublishError};
pub use resilience::{RetryConfig, retry_with_backoff};
pub use retry::{RetryPolicy, RetryScheduler};
pub use router::{EventHandler, FilterFn, Router};
