//! Response DTOs for the lyrics API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::time::Duration;

use serde::Serialize;

use crate::cache::CacheStats;
use crate::persistent::CacheRecord;

/// Cache tier that answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLayer {
    /// In-memory cache hit
    Memory,
    /// Persistent cache hit
    Persistent,
    /// Fetched from the lyrics source
    Upstream,
}

/// Response body for `GET /v1/lyrics`
#[derive(Debug, Clone, Serialize)]
pub struct LyricsResponse {
    /// The lyrics text
    pub data: String,
    /// Whether a cache answered
    pub cached: bool,
    /// Which tier answered
    pub layer: CacheLayer,
}

impl LyricsResponse {
    pub fn new(data: impl Into<String>, layer: CacheLayer) -> Self {
        Self {
            data: data.into(),
            cached: layer != CacheLayer::Upstream,
            layer,
        }
    }
}

/// Response body for `GET /v1/cache`
#[derive(Debug, Clone, Serialize)]
pub struct CacheListResponse {
    /// Active persistent backend
    pub backend: &'static str,
    /// Number of live records
    pub count: usize,
    /// The live records
    pub records: Vec<CacheRecord>,
}

impl CacheListResponse {
    pub fn new(backend: &'static str, records: Vec<CacheRecord>) -> Self {
        Self {
            backend,
            count: records.len(),
            records,
        }
    }
}

/// Response body for `GET /v1/stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of in-memory hits
    pub hits: u64,
    /// Number of in-memory misses
    pub misses: u64,
    /// Entries evicted under the capacity ceiling
    pub evictions: u64,
    /// Entries removed after their TTL elapsed
    pub expirations: u64,
    /// Current number of in-memory entries
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Lifetime of new in-memory entries
    pub ttl_secs: u64,
    /// Active persistent backend
    pub persistent_backend: &'static str,
}

impl StatsResponse {
    pub fn new(stats: CacheStats, ttl: Duration, persistent_backend: &'static str) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            ttl_secs: ttl.as_secs(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expirations: stats.expirations,
            total_entries: stats.total_entries,
            persistent_backend,
        }
    }
}

/// Response body for `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lyrics_response_cached_flag() {
        assert!(LyricsResponse::new("x", CacheLayer::Memory).cached);
        assert!(LyricsResponse::new("x", CacheLayer::Persistent).cached);
        assert!(!LyricsResponse::new("x", CacheLayer::Upstream).cached);
    }

    #[test]
    fn test_lyrics_response_serialize() {
        let json = serde_json::to_value(LyricsResponse::new("la la", CacheLayer::Persistent)).unwrap();
        assert_eq!(json["data"], "la la");
        assert_eq!(json["cached"], true);
        assert_eq!(json["layer"], "persistent");
    }

    #[test]
    fn test_stats_response_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..CacheStats::default()
        };
        let response = StatsResponse::new(stats, Duration::from_secs(1800), "none");
        assert_eq!(response.hit_rate, 0.75);
        assert_eq!(response.ttl_secs, 1800);
        assert_eq!(response.persistent_backend, "none");
    }

    #[test]
    fn test_cache_list_count() {
        let response = CacheListResponse::new("none", Vec::new());
        assert_eq!(response.count, 0);
    }

    #[test]
    fn test_health_response() {
        assert_eq!(HealthResponse::ok().status, "ok");
    }
}
