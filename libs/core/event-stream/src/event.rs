//! The wire-level event: a flat string-to-string field map.
//!
//! Redis Stream entries carry byte-string fields, so every value is coerced
//! to a string on the way in and parsed explicitly by whoever consumes it.
//! Two field names are reserved: `type` drives routing and `_retries`
//! carries the retry attempt counter.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Field that determines which handlers receive the event.
pub const TYPE_FIELD: &str = "type";

/// Field carrying the retry attempt counter (absent means zero).
pub const RETRIES_FIELD: &str = "_retries";

/// A single event as it travels over a Redis Stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: BTreeMap<String, String>,
}

impl Event {
    /// Create an event with the given `type`.
    pub fn new(event_type: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(TYPE_FIELD.to_string(), event_type.into());
        Self { fields }
    }

    /// Create an event from raw fields, without requiring a `type`.
    ///
    /// Entries read off the wire may legitimately be malformed; the
    /// dispatcher is responsible for dropping typeless events.
    pub fn from_fields(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set a field.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Get a field value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// The routing type, if present.
    pub fn event_type(&self) -> Option<&str> {
        self.get(TYPE_FIELD)
    }

    /// Current retry attempt count (0 for a first delivery).
    ///
    /// A missing or non-numeric `_retries` field counts as zero.
    pub fn retries(&self) -> u32 {
        self.get(RETRIES_FIELD)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
    }

    /// A copy of this event with `_retries` incremented.
    pub fn with_retry(&self) -> Self {
        let mut next = self.clone();
        next.set(RETRIES_FIELD, (self.retries() + 1).to_string());
        next
    }

    /// All fields, in key order.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert a raw stream entry into an event.
    ///
    /// Byte strings and integers are coerced to strings; any other Redis
    /// value type is skipped with a warning rather than failing the entry.
    pub fn from_entry(map: &HashMap<String, redis::Value>) -> Self {
        let mut fields = BTreeMap::new();

        for (key, value) in map {
            match value {
                redis::Value::BulkString(bytes) => {
                    fields.insert(key.clone(), String::from_utf8_lossy(bytes).to_string());
                }
                redis::Value::SimpleString(s) => {
                    fields.insert(key.clone(), s.clone());
                }
                redis::Value::Int(i) => {
                    fields.insert(key.clone(), i.to_string());
                }
                other => {
                    warn!(field = %key, value = ?other, "Skipping non-string stream field");
                }
            }
        }

        Self { fields }
    }
}
