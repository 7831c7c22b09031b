//! Redis-backed persistent cache.
//!
//! Each record is a hash under `<prefix><normalized key>` with the fields
//! `value`, `expires_at` (Unix milliseconds) and optionally `ref`. Every
//! write also sets `PEXPIREAT`, so Redis reclaims stale records on its own.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tracing::{debug, info, warn};

use super::{
    expiry_after, live_value, with_deadline, CacheRecord, PersistentCache, CLOSE_TIMEOUT,
    CONNECT_TIMEOUT, OP_TIMEOUT,
};
use crate::cache::normalize_key;
use crate::config::{DEFAULT_REDIS_KEY_PREFIX, DEFAULT_TTL_SECS};
use crate::error::{CacheError, Result};
use crate::tasks::{Reclaimer, RecordDeleter, RECLAIM_QUEUE_CAPACITY};

const FIELD_VALUE: &str = "value";
const FIELD_EXPIRES_AT: &str = "expires_at";
const FIELD_REF: &str = "ref";

/// Keys fetched per SCAN round-trip when listing records.
const SCAN_BATCH: usize = 200;

/// Deletes a record only if it is still expired, so a concurrent refresh
/// survives a late reclaim.
const DELETE_IF_EXPIRED: &str = r#"
local expires_at = redis.call('HGET', KEYS[1], 'expires_at')
if expires_at and tonumber(expires_at) < tonumber(ARGV[1]) then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

// == Settings ==
/// Connection parameters for [`RedisCache`].
#[derive(Debug, Clone)]
pub struct RedisSettings {
    /// `redis://` connection URL
    pub url: String,
    /// Keyspace prefix of every record
    pub key_prefix: String,
    /// Record TTL
    pub ttl: Duration,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: DEFAULT_REDIS_KEY_PREFIX.to_string(),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

// == Redis Cache ==
/// Persistent cache whose expiry is enforced by Redis itself.
pub struct RedisCache {
    conn: RwLock<Option<ConnectionManager>>,
    reclaimer: Mutex<Option<Reclaimer>>,
    key_prefix: String,
    ttl: Duration,
}

impl RedisCache {
    /// Connects to Redis and verifies the server answers `PING`.
    ///
    /// On failure the half-built connection is dropped before the error is
    /// returned.
    pub async fn connect(settings: RedisSettings) -> Result<Self> {
        let client = Client::open(settings.url.as_str())?;
        let mut conn = with_deadline("connect", CONNECT_TIMEOUT, ConnectionManager::new(client)).await?;

        let pong: String = with_deadline("ping", CONNECT_TIMEOUT, redis::cmd("PING").query_async(&mut conn)).await?;
        debug!(reply = %pong, "Redis answered ping");

        let reclaimer = Reclaimer::spawn(
            RedisDeleter {
                conn: conn.clone(),
                key_prefix: settings.key_prefix.clone(),
                script: Script::new(DELETE_IF_EXPIRED),
            },
            RECLAIM_QUEUE_CAPACITY,
            OP_TIMEOUT,
        );

        info!(prefix = %settings.key_prefix, ttl_secs = settings.ttl.as_secs(), "Connected to Redis");

        Ok(Self {
            conn: RwLock::new(Some(conn)),
            reclaimer: Mutex::new(Some(reclaimer)),
            key_prefix: settings.key_prefix,
            ttl: settings.ttl,
        })
    }

    /// Redis key holding the record for a normalized cache key.
    pub fn record_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn connection(&self) -> Result<ConnectionManager> {
        self.conn.read().clone().ok_or(CacheError::NotConnected)
    }


    /// Lists the Redis keys of every record under the prefix.
    async fn scan_record_keys(&self, conn: &mut ConnectionManager) -> Result<Vec<String>> {
        let pattern = format!("{}*", escape_glob(&self.key_prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = with_deadline(
                "scan",
                OP_TIMEOUT,
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut *conn),
            )
            .await?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl PersistentCache for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    /// Redis needs no provisioning: expiry is attached to each record on
    /// write. The call only checks that the server still answers.
    async fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.connection()?;
        let _: String = with_deadline("ensure_schema", OP_TIMEOUT, redis::cmd("PING").query_async(&mut conn)).await?;
        debug!(prefix = %self.key_prefix, "Redis keyspace ready");
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<String> {
        let key = normalize_key(key);
        let mut conn = self.connection().ok()?;

        let fields: HashMap<String, String> = match with_deadline(
            "get",
            OP_TIMEOUT,
            redis::cmd("HGETALL").arg(self.record_key(&key)).query_async(&mut conn),
        )
        .await
        {
            Ok(fields) => fields,
            Err(e) => {
                warn!(key = %key, error = %e, "Redis lookup failed, treating as miss");
                return None;
            }
        };

        if fields.is_empty() {
            debug!(key = %key, "Redis cache miss");
            return None;
        }

        let Some(record) = record_from_fields(key.clone(), fields) else {
            warn!(key = %key, "Malformed Redis record, treating as miss");
            return None;
        };

        live_value(record, Utc::now(), self.reclaimer.lock().as_ref())
    }

    async fn set_with_ref(&self, key: &str, value: &str, source_ref: Option<&str>) -> Result<()> {
        let mut conn = self.connection()?;
        let key = normalize_key(key);
        let record_key = self.record_key(&key);
        let expires_ms = expiry_after(Utc::now(), self.ttl).timestamp_millis();

        let mut hset = redis::cmd("HSET");
        hset.arg(&record_key)
            .arg(FIELD_VALUE)
            .arg(value)
            .arg(FIELD_EXPIRES_AT)
            .arg(expires_ms);
        if let Some(source_ref) = source_ref {
            hset.arg(FIELD_REF).arg(source_ref);
        }

        // Replace the whole hash so a stale `ref` never survives an overwrite.
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("DEL")
            .arg(&record_key)
            .ignore()
            .add_command(hset)
            .ignore()
            .cmd("PEXPIREAT")
            .arg(&record_key)
            .arg(expires_ms)
            .ignore();

        let _: () = with_deadline("set", OP_TIMEOUT, pipe.query_async(&mut conn)).await?;
        debug!(key = %key, "Stored record in Redis");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<CacheRecord>> {
        let mut conn = self.connection()?;
        let record_keys = self.scan_record_keys(&mut conn).await?;
        if record_keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for record_key in &record_keys {
            pipe.cmd("HGETALL").arg(record_key);
        }
        let hashes: Vec<HashMap<String, String>> =
            with_deadline("get_all", OP_TIMEOUT, pipe.query_async(&mut conn)).await?;

        let now = Utc::now();
        let records = record_keys
            .into_iter()
            .zip(hashes)
            .filter_map(|(record_key, fields)| {
                let key = record_key.strip_prefix(&self.key_prefix)?.to_string();
                record_from_fields(key, fields)
            })
            .filter(|record| !record.is_expired_at(now))
            .collect();

        Ok(records)
    }

    async fn close(&self) {
        let conn = self.conn.write().take();
        let reclaimer = self.reclaimer.lock().take();

        if let Some(reclaimer) = reclaimer {
            if tokio::time::timeout(CLOSE_TIMEOUT, reclaimer.shutdown()).await.is_err() {
                warn!("Timed out draining Redis reclaim queue");
            }
        }

        if conn.is_some() {
            info!("Closed Redis connection");
        }
    }
}

/// Decodes a record hash; `None` when required fields are missing or invalid.
fn record_from_fields(key: String, mut fields: HashMap<String, String>) -> Option<CacheRecord> {
    let value = fields.remove(FIELD_VALUE)?;
    let expires_ms: i64 = fields.remove(FIELD_EXPIRES_AT)?.parse().ok()?;
    let expires_at: DateTime<Utc> = Utc.timestamp_millis_opt(expires_ms).single()?;

    Some(CacheRecord {
        key,
        value,
        expires_at,
        source_ref: fields.remove(FIELD_REF),
    })
}

/// Escapes glob metacharacters so the prefix matches literally in SCAN.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// == Reclaim ==
struct RedisDeleter {
    conn: ConnectionManager,
    key_prefix: String,
    /// Hashed once; invoked with `EVALSHA`, falling back to `EVAL`.
    script: Script,
}

#[async_trait]
impl RecordDeleter for RedisDeleter {
    async fn delete_record(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let record_key = format!("{}{}", self.key_prefix, key);
        let _: i64 = self
            .script
            .key(record_key)
            .arg(Utc::now().timestamp_millis())
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
