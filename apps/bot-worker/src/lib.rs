//! Bot Worker Service
//!
//! A background worker that consumes booking events from a Redis stream and
//! notifies the salon admin over Telegram.
//!
//! ## Architecture
//!
//! ```text
//! Redis Stream (bot_events)
//!   ↓ (Consumer Group: bot_group)
//! StreamListener → Dispatcher → notification handlers
//!   ↓ (joins with outbox caches)
//! TelegramNotifier
//!   ↓
//! Admin chat
//! ```
//!
//! Failed handlers hand the event to the retry scheduler; a job queue
//! worker re-publishes it with an incremented attempt counter.

use std::sync::Arc;

use core_config::redis::RedisConfig;
use core_config::stream::StreamConfig;
use core_config::{Environment, FromEnv};
use domain_notifications::{
    BotContext, OutboxCache, TelegramConfig, TelegramNotifier, notifications_router,
};
use event_stream::{
    ConsumerConfig, Dispatcher, JobQueue, JobQueueWorker, RetryScheduler, StreamListener,
    StreamManager, connect_with_retry,
};
use eyre::{Result, WrapErr};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Run the bot worker.
///
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Connects to Redis with retry logic
/// 3. Wires the notification router, retry scheduler, and job queue worker
/// 4. Consumes the event stream until SIGINT/SIGTERM
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);
    core_config::tracing::install_color_eyre();

    info!("Starting bot worker service");
    info!("Environment: {:?}", environment);

    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    let stream_config = StreamConfig::from_env().wrap_err("Failed to load stream configuration")?;
    let telegram_config =
        TelegramConfig::from_env().wrap_err("Failed to load Telegram configuration")?;

    info!("Connecting to Redis...");
    let redis = connect_with_retry(&redis_config.url, None)
        .await
        .wrap_err("Failed to connect to Redis")?;

    let mut manager = StreamManager::new(redis.clone());
    if let Some(max_length) = stream_config.max_length() {
        manager = manager.with_max_length(max_length);
    }
    let manager = Arc::new(manager);

    let context = Arc::new(BotContext {
        notifier: Arc::new(TelegramNotifier::new(telegram_config)),
        appointments: OutboxCache::appointments(redis.clone()),
        contacts: OutboxCache::contacts(redis.clone()),
    });

    let jobs = JobQueue::new(redis);
    let scheduler = RetryScheduler::new(jobs.clone(), &stream_config.stream);
    let dispatcher = Arc::new(
        Dispatcher::new(notifications_router(), context).with_retry(scheduler),
    );

    let consumer_config = ConsumerConfig::new(&stream_config.stream, &stream_config.group);
    info!(
        stream = %consumer_config.stream_name,
        group = %consumer_config.group_name,
        consumer = %consumer_config.consumer_name,
        "Worker configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let requeue_worker = JobQueueWorker::new(jobs, (*manager).clone());
    let requeue_task = tokio::spawn(requeue_worker.run(shutdown_rx.clone()));

    let mut listener = StreamListener::new(manager, dispatcher, consumer_config);
    listener
        .start_listening()
        .await
        .map_err(|e| eyre::eyre!("{}", e))?;

    // Block until the shutdown flag flips, then drain.
    let mut shutdown_rx = shutdown_rx;
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }

    info!("Shutting down...");
    listener.stop_listening().await;
    if let Err(e) = requeue_task.await {
        error!(error = %e, "Job queue worker task failed");
    }

    info!("Bot worker service stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    Ok(())
}
