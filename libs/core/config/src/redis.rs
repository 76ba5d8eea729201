use crate::{FromEnv, env_required};

/// Redis configuration
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String,
}

impl RedisConfig {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

impl FromEnv for RedisConfig {
    /// Requires REDIS_URL to be set (no default)
    fn from_env() -> Result<Self, crate::ConfigError> {
        Ok(Self {
            url: env_required("REDIS_URL")?,
        })
    }
}
