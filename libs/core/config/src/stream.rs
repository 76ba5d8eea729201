use crate::{ConfigError, FromEnv, env_or_default, env_parse_or_default};

/// Event stream configuration: which stream and group the worker serves.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Stream key events are published to
    pub stream: String,

    /// Consumer group for the worker fleet
    pub group: String,

    /// Optional `MAXLEN ~` bound on the stream; 0 disables trimming
    pub max_length: u64,
}

impl StreamConfig {
    pub fn max_length(&self) -> Option<i64> {
        if self.max_length == 0 {
            None
        } else {
            Some(self.max_length as i64)
        }
    }
}

impl FromEnv for StreamConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            stream: env_or_default("BOT_EVENTS_STREAM", "bot_events"),
            group: env_or_default("BOT_EVENTS_GROUP", "bot_group"),
            max_length: env_parse_or_default("BOT_EVENTS_MAXLEN", 0)?,
        })
    }
}
