//! Cache Module
//!
//! Process-local lyrics cache with TTL expiration and capacity eviction.

mod entry;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::CacheEntry;
pub use stats::CacheStats;
pub use store::{LyricsCache, WeakLyricsCache};

use std::time::Duration;

// == Public Constants ==
/// TTL used when a cache is built with a zero TTL
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Capacity used when a cache is built with a zero capacity
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Lower bound for the janitor sweep interval
pub const MIN_JANITOR_INTERVAL: Duration = Duration::from_secs(30);

// == Key Normalization ==
/// Canonical form of a lookup key.
///
/// Queries that differ only by case or surrounding whitespace map to the
/// same entry.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}
