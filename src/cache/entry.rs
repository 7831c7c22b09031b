//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// A cached value and the instant after which it is stale.
///
/// Entries are replaced on every write, never mutated in place.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: String,
    /// Expiration instant
    pub expires_at: Instant,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry that expires `ttl` after `now`.
    pub fn new(value: String, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: now + ttl,
        }
    }

    // == Is Expired ==
    /// Checks if the entry is stale at `now`.
    ///
    /// An entry is still valid at exactly its expiration instant and becomes
    /// stale strictly after it.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}
