//! End-to-end tests for the stream backbone against a real Redis.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use event_stream::{
    ConsumerConfig, Dispatcher, Event, EventHandler, EventPublisher, JobQueue, JobQueueWorker,
    Router, RetryPolicy, RetryScheduler, StreamError, StreamListener, StreamManager,
};
use test_utils::TestRedis;
use tokio::sync::watch;

/// Shared context that records every event a handler sees.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Event>>,
}

impl Recorder {
    fn record(&self, event: &Event) {
        self.seen.lock().unwrap().push(event.clone());
    }

    fn seen(&self) -> Vec<Event> {
        self.seen.lock().unwrap().clone()
    }

    fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

struct RecordingHandler;

#[async_trait]
impl EventHandler<Recorder> for RecordingHandler {
    async fn handle(&self, event: Event, ctx: Arc<Recorder>) -> Result<(), StreamError> {
        ctx.record(&event);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Fails every delivery until `_retries` reaches the threshold.
struct FlakyHandler {
    succeed_at: u32,
}

#[async_trait]
impl EventHandler<Recorder> for FlakyHandler {
    async fn handle(&self, event: Event, ctx: Arc<Recorder>) -> Result<(), StreamError> {
        ctx.record(&event);
        if event.retries() < self.succeed_at {
            Err(StreamError::handler("not yet"))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

async fn wait_until<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

fn fast_config(stream: &str, group: &str, consumer: &str) -> ConsumerConfig {
    ConsumerConfig::new(stream, group)
        .with_consumer_name(consumer)
        .with_block_timeout(Duration::from_millis(200))
        .with_error_backoff(Duration::from_millis(100))
        .with_claim_idle(None)
}

#[tokio::test]
async fn publishes_and_consumes_in_order() {
    let redis = TestRedis::new().await;
    let manager = Arc::new(StreamManager::new(redis.connection()));

    let recorder = Arc::new(Recorder::default());
    let router = Router::new().register("new_appointment", Arc::new(RecordingHandler));
    let dispatcher = Arc::new(Dispatcher::new(router, recorder.clone()));

    let mut listener = StreamListener::new(
        manager.clone(),
        dispatcher,
        fast_config("bot_events", "bot_group", "worker-a"),
    );
    listener.start_listening().await.unwrap();

    let publisher = EventPublisher::new((*manager).clone(), "bot_events");
    for i in 1..=5 {
        publisher
            .publish("new_appointment", [("id", i.to_string())])
            .await
            .unwrap();
    }

    assert!(
        wait_until(|| recorder.count() == 5, Duration::from_secs(10)).await,
        "expected 5 events, saw {}",
        recorder.count()
    );

    let ids: Vec<String> = recorder
        .seen()
        .iter()
        .map(|e| e.get("id").unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);

    listener.stop_listening().await;

    // Everything delivered was acknowledged.
    let pending = manager.pending_count("bot_events", "bot_group").await.unwrap();
    assert_eq!(pending, 0);
}

#[tokio::test]
async fn events_published_before_startup_are_delivered() {
    let redis = TestRedis::new().await;
    let manager = Arc::new(StreamManager::new(redis.connection()));

    // Publish first; group creation at 0 with MKSTREAM makes the backlog
    // visible once a consumer appears.
    let publisher = EventPublisher::new((*manager).clone(), "bot_events");
    publisher
        .publish("new_contact_request", [("request_id", "7")])
        .await
        .unwrap();

    let recorder = Arc::new(Recorder::default());
    let router = Router::new().register("new_contact_request", Arc::new(RecordingHandler));
    let dispatcher = Arc::new(Dispatcher::new(router, recorder.clone()));

    let mut listener = StreamListener::new(
        manager.clone(),
        dispatcher,
        fast_config("bot_events", "bot_group", "worker-a"),
    );
    listener.start_listening().await.unwrap();

    assert!(wait_until(|| recorder.count() == 1, Duration::from_secs(10)).await);
    assert_eq!(recorder.seen()[0].get("request_id"), Some("7"));

    listener.stop_listening().await;
}

#[tokio::test]
async fn typeless_and_unknown_events_are_acked_not_stuck() {
    let redis = TestRedis::new().await;
    let manager = Arc::new(StreamManager::new(redis.connection()));

    let recorder = Arc::new(Recorder::default());
    let router = Router::new().register("known", Arc::new(RecordingHandler));
    let dispatcher = Arc::new(Dispatcher::new(router, recorder.clone()));

    let mut listener = StreamListener::new(
        manager.clone(),
        dispatcher,
        fast_config("bot_events", "bot_group", "worker-a"),
    );
    listener.start_listening().await.unwrap();

    // Malformed: no type field at all.
    let typeless = Event::default().with_field("payload", "x");
    manager.add_event("bot_events", &typeless).await.unwrap();
    // Valid type, but nothing registered for it.
    manager
        .add_event("bot_events", &Event::new("unhandled_type"))
        .await
        .unwrap();
    // A routed event, to prove the loop kept going.
    manager
        .add_event("bot_events", &Event::new("known"))
        .await
        .unwrap();

    assert!(wait_until(|| recorder.count() == 1, Duration::from_secs(10)).await);
    // Give the loop a beat to ack the two dropped entries as well.
    tokio::time::sleep(Duration::from_millis(300)).await;

    listener.stop_listening().await;

    let pending = manager.pending_count("bot_events", "bot_group").await.unwrap();
    assert_eq!(pending, 0, "dropped events must still be acked");
    assert_eq!(recorder.count(), 1);
}

#[tokio::test]
async fn failed_events_are_retried_with_incremented_counter() {
    let redis = TestRedis::new().await;
    let manager = Arc::new(StreamManager::new(redis.connection()));

    let jobs = JobQueue::new(redis.connection());
    let scheduler = RetryScheduler::new(jobs.clone(), "bot_events")
        .with_policy(RetryPolicy::fixed(5, Duration::from_millis(100)));

    let recorder = Arc::new(Recorder::default());
    let router = Router::new().register("notification_status", Arc::new(FlakyHandler { succeed_at: 2 }));
    let dispatcher =
        Arc::new(Dispatcher::new(router, recorder.clone()).with_retry(scheduler));

    let mut listener = StreamListener::new(
        manager.clone(),
        dispatcher,
        fast_config("bot_events", "bot_group", "worker-a"),
    );
    listener.start_listening().await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = JobQueueWorker::new(jobs.clone(), (*manager).clone())
        .with_poll_interval(Duration::from_millis(100));
    let worker_task = tokio::spawn(worker.run(shutdown_rx));

    manager
        .add_event(
            "bot_events",
            &Event::new("notification_status").with_field("status", "failed"),
        )
        .await
        .unwrap();

    // First delivery fails, two requeues follow, third attempt succeeds.
    assert!(
        wait_until(|| recorder.count() == 3, Duration::from_secs(15)).await,
        "expected 3 attempts, saw {}",
        recorder.count()
    );

    let attempts: Vec<u32> = recorder.seen().iter().map(Event::retries).collect();
    assert_eq!(attempts, vec![0, 1, 2]);
    // Payload fields survive the requeue round trip.
    assert_eq!(recorder.seen()[2].get("status"), Some("failed"));

    let _ = shutdown_tx.send(true);
    worker_task.await.unwrap();
    listener.stop_listening().await;

    let pending = manager.pending_count("bot_events", "bot_group").await.unwrap();
    assert_eq!(pending, 0);
    assert_eq!(jobs.len().await.unwrap(), 0);
}

#[tokio::test]
async fn retries_stop_at_max_attempts() {
    let redis = TestRedis::new().await;
    let manager = Arc::new(StreamManager::new(redis.connection()));

    let jobs = JobQueue::new(redis.connection());
    let scheduler = RetryScheduler::new(jobs.clone(), "bot_events")
        .with_policy(RetryPolicy::fixed(2, Duration::from_millis(100)));

    let recorder = Arc::new(Recorder::default());
    // Never succeeds.
    let router = Router::new().register("system_error", Arc::new(FlakyHandler { succeed_at: 99 }));
    let dispatcher =
        Arc::new(Dispatcher::new(router, recorder.clone()).with_retry(scheduler));

    let mut listener = StreamListener::new(
        manager.clone(),
        dispatcher,
        fast_config("bot_events", "bot_group", "worker-a"),
    );
    listener.start_listening().await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = JobQueueWorker::new(jobs.clone(), (*manager).clone())
        .with_poll_interval(Duration::from_millis(100));
    let worker_task = tokio::spawn(worker.run(shutdown_rx));

    manager
        .add_event("bot_events", &Event::new("system_error"))
        .await
        .unwrap();

    // max_attempts = 2: initial delivery plus one retry, then dropped.
    assert!(wait_until(|| recorder.count() == 2, Duration::from_secs(15)).await);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(recorder.count(), 2);
    assert_eq!(jobs.len().await.unwrap(), 0);

    let _ = shutdown_tx.send(true);
    worker_task.await.unwrap();
    listener.stop_listening().await;
}

#[tokio::test]
async fn group_creation_is_idempotent() {
    let redis = TestRedis::new().await;
    let manager = StreamManager::new(redis.connection());

    manager.create_group("bot_events", "bot_group").await.unwrap();
    manager.create_group("bot_events", "bot_group").await.unwrap();

    manager
        .add_event("bot_events", &Event::new("new_appointment"))
        .await
        .unwrap();
    assert_eq!(manager.stream_len("bot_events").await.unwrap(), 1);
}

#[tokio::test]
async fn two_consumers_split_the_stream_without_overlap() {
    let redis = TestRedis::new().await;
    let manager = Arc::new(StreamManager::new(redis.connection()));

    let recorder_a = Arc::new(Recorder::default());
    let recorder_b = Arc::new(Recorder::default());

    let make_listener = |recorder: &Arc<Recorder>, name: &str| {
        let router = Router::new().register("new_appointment", Arc::new(RecordingHandler));
        let dispatcher = Arc::new(Dispatcher::new(router, recorder.clone()));
        StreamListener::new(
            manager.clone(),
            dispatcher,
            fast_config("bot_events", "bot_group", name).with_batch_size(1),
        )
    };

    let mut listener_a = make_listener(&recorder_a, "worker-a");
    let mut listener_b = make_listener(&recorder_b, "worker-b");
    listener_a.start_listening().await.unwrap();
    listener_b.start_listening().await.unwrap();

    let publisher = EventPublisher::new((*manager).clone(), "bot_events");
    for i in 0..20 {
        publisher
            .publish("new_appointment", [("id", i.to_string())])
            .await
            .unwrap();
    }

    assert!(
        wait_until(
            || recorder_a.count() + recorder_b.count() == 20,
            Duration::from_secs(15),
        )
        .await
    );

    listener_a.stop_listening().await;
    listener_b.stop_listening().await;

    let mut all: Vec<String> = recorder_a
        .seen()
        .iter()
        .chain(recorder_b.seen().iter())
        .map(|e| e.get("id").unwrap().to_string())
        .collect();
    all.sort_by_key(|id| id.parse::<u32>().unwrap());
    all.dedup();
    assert_eq!(all.len(), 20, "every event delivered exactly once");
}

#[tokio::test]
async fn stale_entries_are_reclaimed_by_a_live_consumer() {
    let redis = TestRedis::new().await;
    let manager = Arc::new(StreamManager::new(redis.connection()));

    manager.create_group("bot_events", "bot_group").await.unwrap();
    manager
        .add_event("bot_events", &Event::new("new_appointment").with_field("id", "1"))
        .await
        .unwrap();

    // A consumer reads the entry and dies without acking.
    let dead = manager
        .read_events("bot_events", "bot_group", "dead-consumer", 10, None)
        .await
        .unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(
        manager.pending_count("bot_events", "bot_group").await.unwrap(),
        1
    );

    let recorder = Arc::new(Recorder::default());
    let router = Router::new().register("new_appointment", Arc::new(RecordingHandler));
    let dispatcher = Arc::new(Dispatcher::new(router, recorder.clone()));

    let config = fast_config("bot_events", "bot_group", "worker-a")
        .with_claim_idle(Some(Duration::from_millis(200)));
    let mut listener = StreamListener::new(manager.clone(), dispatcher, config);
    listener.start_listening().await.unwrap();

    assert!(
        wait_until(|| recorder.count() == 1, Duration::from_secs(15)).await,
        "reclaimed entry should reach a handler"
    );
    assert_eq!(recorder.seen()[0].get("id"), Some("1"));

    listener.stop_listening().await;

    assert_eq!(
        manager.pending_count("bot_events", "bot_group").await.unwrap(),
        0
    );
}

#[tokio::test]
async fn maxlen_trims_the_stream() {
    let redis = TestRedis::new().await;
    let manager = StreamManager::new(redis.connection()).with_max_length(10);

    for i in 0..500 {
        manager
            .add_event(
                "bot_events",
                &Event::new("new_appointment").with_field("id", i.to_string()),
            )
            .await
            .unwrap();
    }

    // MAXLEN ~ is approximate; it only guarantees the stream stays bounded.
    let len = manager.stream_len("bot_events").await.unwrap();
    assert!(len < 500, "stream should have been trimmed, len = {len}");
}
