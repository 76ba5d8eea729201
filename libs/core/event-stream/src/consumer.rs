//! The consumer loop: blocking group reads, dispatch, unconditional ack.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConsumerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::StreamError;
use crate::event::Event;
use crate::manager::StreamManager;

/// Consumes one stream on behalf of a consumer group and feeds every entry
/// through the dispatcher.
///
/// Every delivered entry is acknowledged, whether its handlers succeeded or
/// not: failed events come back through the retry scheduler as fresh
/// entries, so a poison message can never wedge the group's pending list.
pub struct StreamListener<C: Send + Sync + 'static> {
    manager: Arc<StreamManager>,
    dispatcher: Arc<Dispatcher<C>>,
    config: ConsumerConfig,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl<C: Send + Sync + 'static> StreamListener<C> {
    pub fn new(
        manager: Arc<StreamManager>,
        dispatcher: Arc<Dispatcher<C>>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            manager,
            dispatcher,
            config,
            shutdown: None,
            task: None,
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Ensure the group exists and spawn the consume loop.
    ///
    /// Calling this on a listener that is already running is a no-op.
    pub async fn start_listening(&mut self) -> Result<(), StreamError> {
        if self.task.is_some() {
            warn!(
                stream = %self.config.stream_name,
                group = %self.config.group_name,
                "Listener already running"
            );
            return Ok(());
        }

        self.manager
            .create_group(&self.config.stream_name, &self.config.group_name)
            .await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = self.manager.clone();
        let dispatcher = self.dispatcher.clone();
        let config = self.config.clone();

        info!(
            stream = %config.stream_name,
            group = %config.group_name,
            consumer = %config.consumer_name,
            "Starting stream listener"
        );

        let task = tokio::spawn(async move {
            consume_loop(manager, dispatcher, config, shutdown_rx).await;
        });

        self.shutdown = Some(shutdown_tx);
        self.task = Some(task);
        Ok(())
    }

    /// Signal the loop to stop and wait for it to finish the entry in hand.
    pub async fn stop_listening(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Listener task panicked");
            }
            info!(
                stream = %self.config.stream_name,
                consumer = %self.config.consumer_name,
                "Stream listener stopped"
            );
        }
    }
}

async fn consume_loop<C: Send + Sync + 'static>(
    manager: Arc<StreamManager>,
    dispatcher: Arc<Dispatcher<C>>,
    config: ConsumerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    // Entries delivered to this consumer name before a previous crash come
    // first, then the loop settles into reading new entries.
    match manager
        .read_pending(
            &config.stream_name,
            &config.group_name,
            &config.consumer_name,
            config.batch_size,
        )
        .await
    {
        Ok(entries) if !entries.is_empty() => {
            info!(count = entries.len(), "Processing entries pending from a previous run");
            handle_batch(&manager, &dispatcher, &config, entries).await;
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "Failed to read own pending entries"),
    }

    let mut last_claim = Instant::now();

    loop {
        if *shutdown.borrow() {
            break;
        }

        if let Some(claim_idle) = config.claim_idle {
            if last_claim.elapsed() >= claim_idle {
                last_claim = Instant::now();
                sweep_stale(&manager, &dispatcher, &config).await;
            }
        }

        let read = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            read = manager.read_events(
                &config.stream_name,
                &config.group_name,
                &config.consumer_name,
                config.batch_size,
                Some(config.block_timeout),
            ) => read,
        };

        match read {
            Ok(entries) => {
                if !entries.is_empty() {
                    handle_batch(&manager, &dispatcher, &config, entries).await;
                }
            }
            Err(e) => {
                if e.is_connection_error() {
                    warn!(error = %e, "Redis read failed, backing off");
                } else {
                    error!(error = %e, "Stream read failed, backing off");
                }
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(config.error_backoff) => {}
                }
            }
        }
    }
}

/// Claim entries stuck on dead consumers, then process them through the
/// normal own-pending path.
async fn sweep_stale<C: Send + Sync + 'static>(
    manager: &Arc<StreamManager>,
    dispatcher: &Arc<Dispatcher<C>>,
    config: &ConsumerConfig,
) {
    let Some(claim_idle) = config.claim_idle else {
        return;
    };

    let claimed = match manager
        .claim_stale(
            &config.stream_name,
            &config.group_name,
            &config.consumer_name,
            claim_idle,
            config.batch_size,
        )
        .await
    {
        Ok(claimed) => claimed,
        Err(e) => {
            error!(error = %e, "Stale-entry claim failed");
            return;
        }
    };

    if claimed == 0 {
        return;
    }

    match manager
        .read_pending(
            &config.stream_name,
            &config.group_name,
            &config.consumer_name,
            config.batch_size,
        )
        .await
    {
        Ok(entries) if !entries.is_empty() => {
            info!(count = entries.len(), "Processing entries claimed from stale consumers");
            handle_batch(manager, dispatcher, config, entries).await;
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "Failed to read claimed entries"),
    }
}

async fn handle_batch<C: Send + Sync + 'static>(
    manager: &Arc<StreamManager>,
    dispatcher: &Arc<Dispatcher<C>>,
    config: &ConsumerConfig,
    entries: Vec<(String, Event)>,
) {
    for (entry_id, event) in entries {
        if let Err(e) = dispatcher.process_message(&event).await {
            debug!(entry_id = %entry_id, error = %e, "Event handling failed, acking anyway");
        }

        // Ack regardless of the handler outcome; retries travel as new
        // entries, never through the pending list.
        if let Err(e) = manager
            .ack_event(&config.stream_name, &config.group_name, &entry_id)
            .await
        {
            error!(entry_id = %entry_id, error = %e, "Failed to ack entry");
        }
    }
}
