//! Persistent Cache Module
//!
//! Durable key/value caching behind one trait with two stores:
//!
//! - [`RedisCache`]: one hash per record, expiry enforced by the server
//!   through `PEXPIREAT`.
//! - [`PostgresCache`]: one table row per record, expiry checked at read time
//!   and stale rows reclaimed in the background.
//!
//! Both normalize keys, bound every network call by a deadline and report a
//! failed lookup as a miss.

mod postgres_cache;
mod redis_cache;
mod service;

pub use self::postgres_cache::{validate_table_name, PostgresCache, PostgresSettings};
pub use self::redis_cache::{RedisCache, RedisSettings};
pub use self::service::CacheService;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{BackendKind, PersistentConfig};
use crate::error::{CacheError, Result};
use crate::tasks::Reclaimer;

// == Deadlines ==
/// Upper bound for establishing and probing a connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for a single read, write or delete
pub const OP_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound for releasing a connection
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// == Cache Record ==
/// A persisted cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheRecord {
    /// Normalized lookup key
    pub key: String,
    /// Cached value
    pub value: String,
    /// Instant after which the record is stale
    pub expires_at: DateTime<Utc>,
    /// Where the value came from, when known
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
}

impl CacheRecord {
    /// Stale strictly after `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// `now + ttl`, saturating at the largest representable instant.
pub fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Value of a record read from a store, or `None` if it is stale at `now`.
///
/// A stale record's key is handed to `reclaimer` without waiting.
pub(crate) fn live_value(
    record: CacheRecord,
    now: DateTime<Utc>,
    reclaimer: Option<&Reclaimer>,
) -> Option<String> {
    if !record.is_expired_at(now) {
        return Some(record.value);
    }

    debug!(key = %record.key, "Persistent record expired");
    if let Some(reclaimer) = reclaimer {
        reclaimer.submit(record.key);
    }
    None
}

// == Persistent Cache Trait ==
/// Contract shared by the durable cache backends.
///
/// Keys are normalized by the implementation. Construction (`connect`) is
/// backend-specific and verifies liveness before returning.
#[async_trait]
pub trait PersistentCache: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Idempotently provisions whatever the store needs to hold records.
    async fn ensure_schema(&self) -> Result<()>;

    /// Returns the live value stored under `key`.
    ///
    /// Infrastructure failures are reported as a miss. A stale record is a
    /// miss and is queued for deletion without waiting.
    async fn get(&self, key: &str) -> Option<String>;

    /// Upserts `value` under `key`, expiring one TTL from now.
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_with_ref(key, value, None).await
    }

    /// Like [`set`](Self::set), also storing where the value came from.
    async fn set_with_ref(&self, key: &str, value: &str, source_ref: Option<&str>) -> Result<()>;

    /// Every record that is not yet expired.
    async fn get_all(&self) -> Result<Vec<CacheRecord>>;

    /// Releases the connection. Safe to call repeatedly.
    async fn close(&self);
}

// == Backend Initialization ==
/// Connects the backend selected by `config` and provisions its schema.
///
/// Returns `Ok(None)` when persistence is disabled. A backend whose schema
/// provisioning fails is closed and never returned.
pub async fn connect_backend(config: &PersistentConfig) -> Result<Option<Arc<dyn PersistentCache>>> {
    if config.kind == BackendKind::None {
        return Ok(None);
    }

    let url = config.url.clone().ok_or_else(|| {
        CacheError::Config(format!(
            "no connection target configured for the {} cache backend",
            config.kind
        ))
    })?;

    let backend: Arc<dyn PersistentCache> = match config.kind {
        BackendKind::Redis => Arc::new(
            RedisCache::connect(RedisSettings {
                url,
                key_prefix: config.redis_key_prefix.clone(),
                ttl: config.ttl(),
            })
            .await?,
        ),
        BackendKind::Postgres => Arc::new(
            PostgresCache::connect(PostgresSettings {
                url,
                table: config.table.clone(),
                ttl: config.ttl(),
                ..PostgresSettings::default()
            })
            .await?,
        ),
        BackendKind::None => return Ok(None),
    };

    if let Err(e) = backend.ensure_schema().await {
        warn!(backend = backend.name(), error = %e, "Schema provisioning failed, closing backend");
        backend.close().await;
        return Err(e);
    }

    info!(
        backend = backend.name(),
        ttl_secs = config.ttl_secs,
        "Persistent cache ready"
    );
    Ok(Some(backend))
}

/// Runs `fut` under `deadline`, mapping both the timeout and the inner error
/// into [`CacheError`].
pub(crate) async fn with_deadline<T, E, F>(op: &'static str, deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    CacheError: From<E>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(CacheError::from),
        Err(_) => Err(CacheError::Timeout { op }),
    }
}
