//! Bot Worker Service - Entry Point
//!
//! Background worker that turns booking events from the Redis stream into
//! admin Telegram notifications.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    bot_worker::run().await
}
