//! API Routes
//!
//! Configures the Axum router with all lyrics service endpoints.

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cache_list_handler, health_handler, lyrics_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check endpoint
/// - `GET /v1/lyrics?query=` - Cached lyrics lookup
/// - `GET /v1/cache` - Live persistent cache records
/// - `GET /v1/stats` - In-memory cache statistics
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let v1 = Router::new()
        .route("/lyrics", get(lyrics_handler))
        .route("/cache", get(cache_list_handler))
        .route("/stats", get(stats_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
