//! Outbox caches: JSON snapshots keyed by event identifier.

use std::marker::PhantomData;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::NotificationResult;
use crate::keys;
use crate::models::{AppointmentSnapshot, ContactSnapshot};

/// A typed view over one family of cache keys.
///
/// Corrupt entries are treated as misses: the handler falls back to a
/// degraded notification rather than retrying an event that can never
/// succeed.
#[derive(Clone)]
pub struct OutboxCache<T> {
    redis: ConnectionManager,
    key_fn: fn(&str) -> String,
    ttl_secs: u64,
    _marker: PhantomData<T>,
}

impl OutboxCache<AppointmentSnapshot> {
    pub fn appointments(redis: ConnectionManager) -> Self {
        Self {
            redis,
            key_fn: keys::appointment_cache_key,
            ttl_secs: keys::CACHE_TTL_SECS,
            _marker: PhantomData,
        }
    }
}

impl OutboxCache<ContactSnapshot> {
    pub fn contacts(redis: ConnectionManager) -> Self {
        Self {
            redis,
            key_fn: keys::contact_cache_key,
            ttl_secs: keys::CACHE_TTL_SECS,
            _marker: PhantomData,
        }
    }
}

impl<T> OutboxCache<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Store a snapshot with the standard TTL.
    pub async fn put(&self, id: &str, snapshot: &T) -> NotificationResult<()> {
        let mut conn = self.redis.clone();
        let key = (self.key_fn)(id);
        let json = serde_json::to_string(snapshot)?;

        conn.set_ex::<_, _, ()>(&key, json, self.ttl_secs).await?;
        debug!(key = %key, "Cached snapshot");
        Ok(())
    }

    /// Fetch a snapshot. Missing and corrupt entries both come back as None.
    pub async fn get(&self, id: &str) -> NotificationResult<Option<T>> {
        let mut conn = self.redis.clone();
        let key = (self.key_fn)(id);

        let json: Option<String> = conn.get(&key).await?;
        let Some(json) = json else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt cache entry, treating as miss");
                Ok(None)
            }
        }
    }

    /// Remove a snapshot once its notification has been delivered.
    pub async fn delete(&self, id: &str) -> NotificationResult<()> {
        let mut conn = self.redis.clone();
        let key = (self.key_fn)(id);
        let _: i64 = conn.del(&key).await?;
        Ok(())
    }
}
