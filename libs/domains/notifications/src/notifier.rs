//! Delivery of admin notifications, currently via Telegram.

use async_trait::async_trait;
use core_config::{FromEnv, env_required};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{NotificationError, NotificationResult};

/// Sink for rendered admin messages.
#[async_trait]
pub trait AdminNotifier: Send + Sync {
    /// Deliver one message to the admin channel. HTML markup allowed.
    async fn notify(&self, text: &str) -> NotificationResult<()>;
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token from BotFather.
    pub bot_token: String,
    /// Chat that receives admin notifications.
    pub admin_chat_id: String,
    /// API base URL (overridable for tests).
    pub api_url: String,
}

impl TelegramConfig {
    pub fn new(bot_token: String, admin_chat_id: String) -> Self {
        Self {
            bot_token,
            admin_chat_id,
            api_url: "https://api.telegram.org".to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

impl FromEnv for TelegramConfig {
    fn from_env() -> Result<Self, core_config::ConfigError> {
        Ok(Self::new(
            env_required("TELEGRAM_BOT_TOKEN")?,
            env_required("TELEGRAM_ADMIN_CHAT_ID")?,
        ))
    }
}

/// Telegram Bot API notifier.
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl AdminNotifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> NotificationResult<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_url, self.config.bot_token
        );

        let request = SendMessageRequest {
            chat_id: &self.config.admin_chat_id,
            text,
            parse_mode: "HTML",
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        let body: SendMessageResponse = response.json().await.map_err(|e| {
            NotificationError::NotifierError(format!("Telegram returned non-JSON ({status}): {e}"))
        })?;

        if !body.ok {
            let description = body.description.unwrap_or_else(|| status.to_string());
            error!(description = %description, "Telegram rejected the message");
            return Err(NotificationError::NotifierError(description));
        }

        debug!(chars = text.len(), "Admin notification delivered");
        Ok(())
    }
}
