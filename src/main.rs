//! Lyrics Cache - lyrics lookup service with layered caching
//!
//! Fronts an expensive lyrics lookup with a TTL in-memory cache and an
//! optional persistent cache backed by Redis or Postgres.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lyrics_cache::api::{create_router, AppState};
use lyrics_cache::config::Config;
use lyrics_cache::persistent::CacheService;
use lyrics_cache::source::UpstreamSource;

/// Main entry point for the lyrics service.
///
/// # Startup Sequence
/// 1. Load `.env` if present
/// 2. Initialize tracing (JSON output in production)
/// 3. Load configuration from environment variables
/// 4. Connect the persistent cache, continuing without it on failure
/// 5. Create the in-memory cache and start its janitor
/// 6. Start HTTP server on configured port
/// 7. On SIGINT/SIGTERM: stop serving, join the janitor, close the backend
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    init_tracing();

    if let Err(e) = dotenv {
        warn!("Could not load .env file: {}", e);
    }

    info!("Starting lyrics cache service");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, ttl={}s, backend={}, port={}, env={}",
        config.memory.max_entries,
        config.memory.ttl_secs,
        config.persistent.kind,
        config.server_port,
        config.app_env
    );

    let persistent = match CacheService::from_config(&config.persistent).await {
        Ok(service) => service,
        Err(e) => {
            warn!(error = %e, "Persistent cache unavailable, continuing without it");
            CacheService::disabled()
        }
    };

    let source = Arc::new(UpstreamSource::new(config.upstream_url.clone())?);
    let state = AppState::from_config(&config, persistent.clone(), source);
    let cache = state.cache.clone();

    if cache.start_janitor() {
        info!(
            interval_secs = cache.janitor_interval().as_secs(),
            "Cache janitor started"
        );
    }

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cache.shutdown().await;
    persistent.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Installs the global subscriber.
///
/// Defaults to "lyrics_cache=info,tower_http=info", overridable with RUST_LOG.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lyrics_cache=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    let production = env::var("APP_ENV")
        .map(|v| v.eq_ignore_ascii_case("production"))
        .unwrap_or(false);

    if production {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
