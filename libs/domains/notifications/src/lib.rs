//! Admin notifications over the event stream.
//!
//! Consumes booking events (`new_appointment`, `notification_status`,
//! `new_contact_request`, `system_error`), joins them with the snapshots the
//! booking flow cached in Redis, and delivers rendered messages to the admin
//! Telegram channel.

pub mod cache;
pub mod error;
pub mod events;
pub mod handlers;
pub mod keys;
pub mod models;
pub mod notifier;

pub use cache::OutboxCache;
pub use error::{NotificationError, NotificationResult};
pub use events::EventType;
pub use handlers::{BotContext, notifications_router};
pub use models::{AppointmentSnapshot, ContactSnapshot};
pub use notifier::{AdminNotifier, TelegramConfig, TelegramNotifier};
