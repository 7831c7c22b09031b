//! API Handlers
//!
//! HTTP request handlers for each lyrics service endpoint.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use tracing::debug;

use crate::cache::LyricsCache;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    CacheLayer, CacheListResponse, HealthResponse, LyricsQuery, LyricsResponse, StatsResponse,
};
use crate::persistent::CacheService;
use crate::source::LyricsSource;

/// Application state shared across all handlers.
///
/// Every field is cheap to clone and safe for concurrent use.
#[derive(Clone)]
pub struct AppState {
    /// Process-local TTL cache
    pub cache: LyricsCache,
    /// Persistent cache façade, possibly disabled
    pub persistent: CacheService,
    /// The uncached lookup
    pub source: Arc<dyn LyricsSource>,
}

impl AppState {
    /// Creates a new AppState from its parts.
    pub fn new(cache: LyricsCache, persistent: CacheService, source: Arc<dyn LyricsSource>) -> Self {
        Self {
            cache,
            persistent,
            source,
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Builds the in-memory cache from the Config; the persistent façade is
    /// connected separately because it may fail.
    pub fn from_config(
        config: &Config,
        persistent: CacheService,
        source: Arc<dyn LyricsSource>,
    ) -> Self {
        let cache = LyricsCache::new(config.memory.ttl(), config.memory.max_entries);
        Self::new(cache, persistent, source)
    }
}

/// Handler for GET /v1/lyrics?query=
///
/// Answers from the in-memory cache, then the persistent cache, then the
/// lyrics source, writing each miss back to the tiers above it.
pub async fn lyrics_handler(
    State(state): State<AppState>,
    Query(req): Query<LyricsQuery>,
) -> ApiResult<Json<LyricsResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }
    let query = req.query;

    if let Some(lyrics) = state.cache.get(&query) {
        debug!(query = %query, "Served from memory cache");
        return Ok(Json(LyricsResponse::new(lyrics, CacheLayer::Memory)));
    }

    if let Some(lyrics) = state.persistent.get(&query).await {
        debug!(query = %query, "Served from persistent cache");
        state.cache.set(&query, lyrics.clone());
        return Ok(Json(LyricsResponse::new(lyrics, CacheLayer::Persistent)));
    }

    let lyrics = state.source.fetch(query.trim()).await?;

    state.cache.set(&query, lyrics.text.clone());
    if let Err(e) = state
        .persistent
        .set_with_ref(&query, &lyrics.text, lyrics.source_ref.as_deref())
        .await
    {
        debug!(query = %query, error = %e, "Persistent cache write failed, result not cached");
    }

    Ok(Json(LyricsResponse::new(lyrics.text, CacheLayer::Upstream)))
}

/// Handler for GET /v1/cache
///
/// Lists the live records of the persistent cache.
pub async fn cache_list_handler(State(state): State<AppState>) -> ApiResult<Json<CacheListResponse>> {
    let records = state.persistent.get_all().await?;
    Ok(Json(CacheListResponse::new(
        state.persistent.backend_name(),
        records,
    )))
}

/// Handler for GET /v1/stats
///
/// Returns in-memory cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.cache.stats(),
        state.cache.ttl(),
        state.persistent.backend_name(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Lyrics;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LyricsSource for CountingSource {
        async fn fetch(&self, query: &str) -> ApiResult<Lyrics> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query == "unknown" {
                return Err(ApiError::Upstream("no lyrics found".to_string()));
            }
            Ok(Lyrics {
                text: format!("lyrics of {query}"),
                source_ref: None,
            })
        }
    }

    fn test_state() -> (AppState, Arc<CountingSource>) {
        let source = Arc::new(CountingSource::default());
        let state = AppState::new(
            LyricsCache::new(Duration::from_secs(300), 100),
            CacheService::disabled(),
            source.clone(),
        );
        (state, source)
    }

    fn query(q: &str) -> Query<LyricsQuery> {
        Query(LyricsQuery {
            query: q.to_string(),
        })
    }

    #[tokio::test]
    async fn test_lyrics_miss_then_hit() {
        let (state, source) = test_state();

        let first = lyrics_handler(State(state.clone()), query("Let It Be")).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.layer, CacheLayer::Upstream);
        assert_eq!(first.data, "lyrics of Let It Be");

        let second = lyrics_handler(State(state.clone()), query("  let it be ")).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.layer, CacheLayer::Memory);
        assert_eq!(second.data, "lyrics of Let It Be");

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lyrics_empty_query() {
        let (state, source) = test_state();

        let result = lyrics_handler(State(state), query("")).await;
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lyrics_upstream_failure_is_not_cached() {
        let (state, source) = test_state();

        assert!(lyrics_handler(State(state.clone()), query("unknown")).await.is_err());
        assert!(lyrics_handler(State(state.clone()), query("unknown")).await.is_err());

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(state.cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_list_without_backend() {
        let (state, _) = test_state();

        let response = cache_list_handler(State(state)).await.unwrap();
        assert_eq!(response.backend, "none");
        assert_eq!(response.count, 0);
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let (state, _) = test_state();
        state.cache.set("song", "words");
        state.cache.get("song");

        let response = stats_handler(State(state)).await;
        assert_eq!(response.hits, 1);
        assert_eq!(response.total_entries, 1);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "ok");
    }
}
