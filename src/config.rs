//! Configuration Module
//!
//! Handles loading and managing service configuration from environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Default TTL in seconds shared by both caches
pub const DEFAULT_TTL_SECS: u64 = 1800;
/// Default in-memory capacity
pub const DEFAULT_MAX_ENTRIES: usize = 1000;
/// Default Redis keyspace prefix for persistent records
pub const DEFAULT_REDIS_KEY_PREFIX: &str = "lyricscrawl:lyrics_cache:";
/// Default Postgres table for persistent records
pub const DEFAULT_TABLE: &str = "lyrics_cache";

// == Backend Kind ==
/// Which persistent backend, if any, the service should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Run without persistence
    #[default]
    None,
    /// Redis hashes with server-side expiry
    Redis,
    /// Postgres table with read-time expiry checks
    Postgres,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "off" => Ok(Self::None),
            "redis" => Ok(Self::Redis),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("unknown cache backend '{other}'")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Redis => "redis",
            Self::Postgres => "postgres",
        };
        f.write_str(name)
    }
}

// == Memory Cache Config ==
/// Parameters of the in-memory cache.
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Entry TTL in seconds
    pub ttl_secs: u64,
    /// Maximum number of entries
    pub max_entries: usize,
}

impl MemoryCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

// == Persistent Config ==
/// Parameters of the persistent cache backend.
#[derive(Debug, Clone)]
pub struct PersistentConfig {
    /// Selected backend
    pub kind: BackendKind,
    /// Connection target; required for every backend but `None`
    pub url: Option<String>,
    /// Record TTL in seconds
    pub ttl_secs: u64,
    /// Keyspace prefix used by the Redis backend
    pub redis_key_prefix: String,
    /// Table used by the Postgres backend
    pub table: String,
}

impl PersistentConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::None,
            url: None,
            ttl_secs: DEFAULT_TTL_SECS,
            redis_key_prefix: DEFAULT_REDIS_KEY_PREFIX.to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

// == Config ==
/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// In-memory cache settings
    pub memory: MemoryCacheConfig,
    /// Persistent cache settings
    pub persistent: PersistentConfig,
    /// Endpoint of the lyrics source
    pub upstream_url: String,
    /// HTTP server port
    pub server_port: u16,
    /// Deployment environment; `production` switches logs to JSON
    pub app_env: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `APP_LYRICS_CACHE_TTL_SECONDS` - TTL of both caches (default: 1800)
    /// - `APP_LYRICS_CACHE_MAX_ENTRIES` - In-memory capacity (default: 1000)
    /// - `APP_LYRICS_CACHE_BACKEND` - `none`, `redis` or `postgres` (default: none)
    /// - `REDIS_URL` - Redis connection target, required for the redis backend
    /// - `REDIS_KEY_PREFIX` - Redis keyspace (default: `lyricscrawl:lyrics_cache:`)
    /// - `DATABASE_URL` - Postgres connection target, required for the postgres backend
    /// - `APP_LYRICS_CACHE_TABLE` - Postgres table (default: `lyrics_cache`)
    /// - `APP_LYRICS_UPSTREAM_URL` - Lyrics source endpoint
    /// - `APP_PORT` - HTTP server port (default: 8080)
    /// - `APP_ENV` - Deployment environment (default: development)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a Config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let ttl_secs = positive(&lookup, "APP_LYRICS_CACHE_TTL_SECONDS").unwrap_or(DEFAULT_TTL_SECS);

        let kind = match lookup("APP_LYRICS_CACHE_BACKEND").map(|v| v.parse::<BackendKind>()) {
            Some(Ok(kind)) => kind,
            Some(Err(e)) => {
                warn!("{e}, running without a persistent cache");
                BackendKind::None
            }
            None => BackendKind::None,
        };

        let url = match kind {
            BackendKind::None => None,
            BackendKind::Redis => non_empty(&lookup, "REDIS_URL"),
            BackendKind::Postgres => non_empty(&lookup, "DATABASE_URL"),
        };

        Self {
            memory: MemoryCacheConfig {
                ttl_secs,
                max_entries: positive(&lookup, "APP_LYRICS_CACHE_MAX_ENTRIES")
                    .unwrap_or(DEFAULT_MAX_ENTRIES),
            },
            persistent: PersistentConfig {
                kind,
                url,
                ttl_secs,
                redis_key_prefix: non_empty(&lookup, "REDIS_KEY_PREFIX")
                    .unwrap_or(defaults.persistent.redis_key_prefix),
                table: non_empty(&lookup, "APP_LYRICS_CACHE_TABLE")
                    .unwrap_or(defaults.persistent.table),
            },
            upstream_url: non_empty(&lookup, "APP_LYRICS_UPSTREAM_URL")
                .unwrap_or(defaults.upstream_url),
            server_port: positive(&lookup, "APP_PORT").unwrap_or(defaults.server_port),
            app_env: non_empty(&lookup, "APP_ENV").unwrap_or(defaults.app_env),
        }
    }

    /// Whether logs should be emitted as JSON.
    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory: MemoryCacheConfig::default(),
            persistent: PersistentConfig::default(),
            upstream_url: "http://127.0.0.1:9000/lyrics".to_string(),
            server_port: 8080,
            app_env: "development".to_string(),
        }
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses a strictly positive number; zero, negatives and garbage yield `None`.
fn positive<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr + Default + PartialOrd,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v > T::default())
}
