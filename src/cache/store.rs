//! Cache Store Module
//!
//! Main cache engine: a HashMap behind a reader/writer lock with TTL expiry,
//! earliest-expiry eviction and an optional background janitor.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::stats::StatsCounters;
use crate::cache::{
    normalize_key, CacheEntry, CacheStats, DEFAULT_MAX_ENTRIES, DEFAULT_TTL, MIN_JANITOR_INTERVAL,
};
use crate::tasks::spawn_janitor;

#[derive(Debug)]
struct CacheInner {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
    stats: StatsCounters,
}

impl CacheInner {
    fn purge_expired(&self) -> usize {
        let purged = {
            let mut entries = self.entries.write();
            purge_expired_locked(&mut entries, Instant::now())
        };
        self.stats.record_expirations(purged);
        purged
    }
}

/// A running sweep and the token that stops it.
#[derive(Debug)]
struct Janitor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

// == Lyrics Cache ==
/// In-memory TTL cache safe for concurrent use.
///
/// Cloning is cheap and every clone shares the same map and janitor.
/// Lookups take the shared lock; writes, including the lazy removal of a
/// stale entry found on read, take the exclusive lock.
#[derive(Debug, Clone)]
pub struct LyricsCache {
    inner: Arc<CacheInner>,
    janitor: Arc<Mutex<Option<Janitor>>>,
}

impl LyricsCache {
    // == Constructor ==
    /// Creates a cache with the given TTL and capacity.
    ///
    /// A zero TTL falls back to [`DEFAULT_TTL`] and a zero capacity to
    /// [`DEFAULT_MAX_ENTRIES`].
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };
        let max_entries = if max_entries == 0 {
            DEFAULT_MAX_ENTRIES
        } else {
            max_entries
        };

        Self {
            inner: Arc::new(CacheInner {
                entries: RwLock::new(HashMap::with_capacity(max_entries)),
                ttl,
                max_entries,
                stats: StatsCounters::default(),
            }),
            janitor: Arc::new(Mutex::new(None)),
        }
    }

    /// Configured time-to-live of new entries.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Configured capacity ceiling.
    pub fn max_entries(&self) -> usize {
        self.inner.max_entries
    }

    // == Get ==
    /// Returns the value stored under `key` if present and not expired.
    ///
    /// A stale entry is never returned; it is removed under the write lock
    /// before the miss is reported.
    pub fn get(&self, key: &str) -> Option<String> {
        let key = normalize_key(key);
        let now = Instant::now();

        {
            let entries = self.inner.entries.read();
            match entries.get(&key) {
                None => {
                    self.inner.stats.record_miss();
                    return None;
                }
                Some(entry) if !entry.is_expired_at(now) => {
                    self.inner.stats.record_hit();
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // A concurrent set may have refreshed the entry between the two locks.
        let mut entries = self.inner.entries.write();
        if entries.get(&key).is_some_and(|entry| entry.is_expired_at(now)) {
            entries.remove(&key);
            self.inner.stats.record_expirations(1);
            debug!(key = %key, "Lazily evicted expired entry");
        }
        self.inner.stats.record_miss();
        None
    }

    // == Set ==
    /// Stores `value` under `key`, expiring one TTL from now.
    ///
    /// At capacity, expired entries are purged first; if the cache is still
    /// full, the entry with the earliest expiration makes room.
    pub fn set(&self, key: &str, value: impl Into<String>) {
        let key = normalize_key(key);
        let now = Instant::now();
        let entry = CacheEntry::new(value.into(), now, self.inner.ttl);

        let mut entries = self.inner.entries.write();

        if entries.len() >= self.inner.max_entries {
            let purged = purge_expired_locked(&mut entries, now);
            self.inner.stats.record_expirations(purged);
        }

        if entries.len() >= self.inner.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| key.clone());

            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                self.inner.stats.record_eviction();
                debug!(key = %oldest, "Evicted earliest-expiring entry");
            }
        }

        entries.insert(key, entry);
    }

    // == Purge Expired ==
    /// Removes every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    /// Non-owning handle to the same entries.
    pub fn downgrade(&self) -> WeakLyricsCache {
        WeakLyricsCache {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot(self.len())
    }

    // == Length ==
    /// Number of entries physically held, stale ones included.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    // == Janitor ==
    /// Interval between janitor sweeps: half the TTL, never under 30 seconds.
    pub fn janitor_interval(&self) -> Duration {
        (self.inner.ttl / 2).max(MIN_JANITOR_INTERVAL)
    }

    /// Starts the background sweep on the current Tokio runtime.
    ///
    /// Returns `false` without spawning anything when a sweep is already
    /// running or when called outside a runtime.
    pub fn start_janitor(&self) -> bool {
        let mut slot = self.janitor.lock();
        if slot.as_ref().is_some_and(|janitor| !janitor.token.is_cancelled()) {
            debug!("Cache janitor already running");
            return false;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "Cannot start cache janitor outside a Tokio runtime");
                return false;
            }
        };

        let token = CancellationToken::new();
        let handle = spawn_janitor(&runtime, self.downgrade(), self.janitor_interval(), token.clone());
        *slot = Some(Janitor { token, handle });
        true
    }

    /// Whether a sweep has been started and not stopped.
    pub fn is_janitor_running(&self) -> bool {
        self.janitor
            .lock()
            .as_ref()
            .is_some_and(|janitor| !janitor.token.is_cancelled())
    }

    /// Signals the sweep to terminate.
    ///
    /// Never blocks; repeated calls and calls without a running sweep are
    /// no-ops.
    pub fn stop(&self) {
        if let Some(janitor) = self.janitor.lock().as_ref() {
            janitor.token.cancel();
        }
    }

    /// Stops the sweep and waits for its task to finish.
    pub async fn shutdown(&self) {
        let janitor = self.janitor.lock().take();
        if let Some(Janitor { token, handle }) = janitor {
            token.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Cache janitor did not exit cleanly");
            }
        }
    }
}

// == Weak Handle ==
/// A [`LyricsCache`] reference that does not keep the entries alive.
///
/// Held by the janitor so the sweep ends once every owning handle is gone.
#[derive(Debug, Clone)]
pub struct WeakLyricsCache {
    inner: Weak<CacheInner>,
}

impl WeakLyricsCache {
    /// Purges expired entries, or returns `None` if the cache was dropped.
    pub fn purge_expired(&self) -> Option<usize> {
        self.inner.upgrade().map(|inner| inner.purge_expired())
    }
}

fn purge_expired_locked(entries: &mut HashMap<String, CacheEntry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired_at(now));
    before - entries.len()
}
