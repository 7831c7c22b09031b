//! Postgres-backed persistent cache.
//!
//! Postgres has no native row expiry, so the backend checks `expires_at` on
//! every read and hands stale keys to a background reclaimer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use super::{
    expiry_after, live_value, with_deadline, CacheRecord, PersistentCache, CLOSE_TIMEOUT,
    CONNECT_TIMEOUT, OP_TIMEOUT,
};
use crate::cache::normalize_key;
use crate::config::{DEFAULT_TABLE, DEFAULT_TTL_SECS};
use crate::error::{CacheError, Result};
use crate::tasks::{Reclaimer, RecordDeleter, RECLAIM_QUEUE_CAPACITY};

// == Settings ==
/// Connection parameters for [`PostgresCache`].
#[derive(Debug, Clone)]
pub struct PostgresSettings {
    /// `postgres://` connection URL
    pub url: String,
    /// Table holding the records, optionally schema-qualified
    pub table: String,
    /// Record TTL
    pub ttl: Duration,
    /// Pool size
    pub max_connections: u32,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/lyricscrawl".to_string(),
            table: DEFAULT_TABLE.to_string(),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            max_connections: 5,
        }
    }
}

/// SQL text rendered once for the configured table.
#[derive(Debug)]
struct Statements {
    create_table: String,
    create_index: String,
    select: String,
    select_live: String,
    upsert: String,
    delete_expired: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        let index = format!("{}_expires_at_idx", table.replace('.', "_"));
        Self {
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                    key TEXT PRIMARY KEY, \
                    value TEXT NOT NULL, \
                    expires_at TIMESTAMPTZ NOT NULL, \
                    source_ref TEXT\
                )"
            ),
            create_index: format!("CREATE INDEX IF NOT EXISTS {index} ON {table} (expires_at)"),
            select: format!("SELECT value, expires_at FROM {table} WHERE key = $1"),
            select_live: format!(
                "SELECT key, value, expires_at, source_ref FROM {table} \
                 WHERE expires_at >= $1 ORDER BY key"
            ),
            upsert: format!(
                "INSERT INTO {table} (key, value, expires_at, source_ref) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (key) DO UPDATE SET \
                    value = EXCLUDED.value, \
                    expires_at = EXCLUDED.expires_at, \
                    source_ref = EXCLUDED.source_ref"
            ),
            delete_expired: format!("DELETE FROM {table} WHERE key = $1 AND expires_at < $2"),
        }
    }
}

/// Accepts `name` or `schema.name` made of ASCII letters, digits and
/// underscores, each part starting with a letter or underscore and at most
/// 63 bytes long.
pub fn validate_table_name(table: &str) -> Result<()> {
    let parts: Vec<&str> = table.split('.').collect();
    let valid = parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                && part.len() <= 63
        });

    if valid {
        Ok(())
    } else {
        Err(CacheError::Config(format!("invalid cache table name '{table}'")))
    }
}

// == Postgres Cache ==
/// Persistent cache that emulates expiry with read-time checks.
pub struct PostgresCache {
    pool: RwLock<Option<PgPool>>,
    reclaimer: Mutex<Option<Reclaimer>>,
    statements: Statements,
    table: String,
    ttl: Duration,
}

impl PostgresCache {
    /// Opens a pool and verifies it with `SELECT 1`.
    ///
    /// On failure the pool is closed before the error is returned.
    pub async fn connect(settings: PostgresSettings) -> Result<Self> {
        validate_table_name(&settings.table)?;

        let pool = with_deadline(
            "connect",
            CONNECT_TIMEOUT,
            PgPoolOptions::new()
                .max_connections(settings.max_connections.max(1))
                .acquire_timeout(OP_TIMEOUT)
                .connect(&settings.url),
        )
        .await?;

        if let Err(e) = with_deadline("ping", CONNECT_TIMEOUT, sqlx::query("SELECT 1").execute(&pool)).await {
            pool.close().await;
            return Err(e);
        }

        let statements = Statements::for_table(&settings.table);
        let reclaimer = Reclaimer::spawn(
            PostgresDeleter {
                pool: pool.clone(),
                delete_expired: statements.delete_expired.clone(),
            },
            RECLAIM_QUEUE_CAPACITY,
            OP_TIMEOUT,
        );

        info!(table = %settings.table, ttl_secs = settings.ttl.as_secs(), "Connected to Postgres");

        Ok(Self {
            pool: RwLock::new(Some(pool)),
            reclaimer: Mutex::new(Some(reclaimer)),
            statements,
            table: settings.table,
            ttl: settings.ttl,
        })
    }

    fn pool(&self) -> Result<PgPool> {
        self.pool.read().clone().ok_or(CacheError::NotConnected)
    }

}

#[async_trait]
impl PersistentCache for PostgresCache {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn ensure_schema(&self) -> Result<()> {
        let pool = self.pool()?;

        for statement in [&self.statements.create_table, &self.statements.create_index] {
            with_deadline("ensure_schema", OP_TIMEOUT, sqlx::query(statement).execute(&pool))
                .await
                .map_err(|e| CacheError::Schema(e.to_string()))?;
        }

        debug!(table = %self.table, "Cache table ready");
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<String> {
        let key = normalize_key(key);
        let pool = self.pool().ok()?;

        let row: Option<(String, DateTime<Utc>)> = match with_deadline(
            "get",
            OP_TIMEOUT,
            sqlx::query_as(&self.statements.select)
                .bind(&key)
                .fetch_optional(&pool),
        )
        .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!(key = %key, error = %e, "Postgres lookup failed, treating as miss");
                return None;
            }
        };

        let Some((value, expires_at)) = row else {
            debug!(key = %key, "Postgres cache miss");
            return None;
        };

        let record = CacheRecord {
            key,
            value,
            expires_at,
            source_ref: None,
        };
        live_value(record, Utc::now(), self.reclaimer.lock().as_ref())
    }

    async fn set_with_ref(&self, key: &str, value: &str, source_ref: Option<&str>) -> Result<()> {
        let pool = self.pool()?;
        let key = normalize_key(key);
        let expires_at = expiry_after(Utc::now(), self.ttl);

        with_deadline(
            "set",
            OP_TIMEOUT,
            sqlx::query(&self.statements.upsert)
                .bind(&key)
                .bind(value)
                .bind(expires_at)
                .bind(source_ref)
                .execute(&pool),
        )
        .await?;

        debug!(key = %key, "Stored record in Postgres");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<CacheRecord>> {
        let pool = self.pool()?;

        let rows: Vec<(String, String, DateTime<Utc>, Option<String>)> = with_deadline(
            "get_all",
            OP_TIMEOUT,
            sqlx::query_as(&self.statements.select_live)
                .bind(Utc::now())
                .fetch_all(&pool),
        )
        .await?;

        Ok(rows
            .into_iter()
            .map(|(key, value, expires_at, source_ref)| CacheRecord {
                key,
                value,
                expires_at,
                source_ref,
            })
            .collect())
    }

    async fn close(&self) {
        let pool = self.pool.write().take();
        let reclaimer = self.reclaimer.lock().take();

        if let Some(reclaimer) = reclaimer {
            if tokio::time::timeout(CLOSE_TIMEOUT, reclaimer.shutdown()).await.is_err() {
                warn!("Timed out draining Postgres reclaim queue");
            }
        }

        if let Some(pool) = pool {
            if tokio::time::timeout(CLOSE_TIMEOUT, pool.close()).await.is_err() {
                warn!("Timed out closing Postgres pool");
            } else {
                info!("Closed Postgres pool");
            }
        }
    }
}

// == Reclaim ==
struct PostgresDeleter {
    pool: PgPool,
    delete_expired: String,
}

#[async_trait]
impl RecordDeleter for PostgresDeleter {
    async fn delete_record(&self, key: &str) -> Result<()> {
        // The expiry guard keeps a row refreshed since the stale read.
        sqlx::query(&self.delete_expired)
            .bind(key)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("lyrics_cache").is_ok());
        assert!(validate_table_name("_cache2").is_ok());
        assert!(validate_table_name("cache.lyrics_cache").is_ok());

        for bad in [
            "",
            "2fast",
            "lyrics-cache",
            "lyrics cache",
            "a.b.c",
            "t; DROP TABLE users",
            ".lyrics",
        ] {
            assert!(
                matches!(validate_table_name(bad), Err(CacheError::Config(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(validate_table_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn test_statements_use_table() {
        let statements = Statements::for_table("cache.lyrics");

        assert!(statements
            .create_table
            .starts_with("CREATE TABLE IF NOT EXISTS cache.lyrics ("));
        assert!(statements.create_table.contains("key TEXT PRIMARY KEY"));
        assert_eq!(
            statements.create_index,
            "CREATE INDEX IF NOT EXISTS cache_lyrics_expires_at_idx ON cache.lyrics (expires_at)"
        );
        assert!(statements.upsert.contains("ON CONFLICT (key) DO UPDATE"));
        assert!(statements.delete_expired.ends_with("expires_at < $2"));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_table_before_connecting() {
        let result = PostgresCache::connect(PostgresSettings {
            table: "bad-name".to_string(),
            ..PostgresSettings::default()
        })
        .await;
        assert!(matches!(result, Err(CacheError::Config(_))));
    }
}
