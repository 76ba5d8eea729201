//! Redis key construction for the notification outbox caches.

/// Cache entries outlive any realistic retry schedule, then expire on
/// their own if an event is permanently lost.
pub const CACHE_TTL_SECS: u64 = 86_400;

/// Key for a cached appointment snapshot.
pub fn appointment_cache_key(appointment_id: &str) -> String {
    format!("notifications:cache:{appointment_id}")
}

/// Key for a cached contact-request snapshot.
pub fn contact_cache_key(request_id: &str) -> String {
    format!("notifications:contact_cache:{request_id}")
}
