//! Cache façade over the configured persistent backend.

use std::fmt;
use std::sync::Arc;

use crate::config::PersistentConfig;
use crate::error::Result;

use super::{connect_backend, CacheRecord, PersistentCache};

// == Cache Service ==
/// Uniform access to the persistent cache, or to nothing at all.
///
/// Built once at startup and shared by the request handlers. Without a
/// backend every lookup misses and every write is a silent no-op, so the
/// service keeps working, only slower.
#[derive(Clone, Default)]
pub struct CacheService {
    backend: Option<Arc<dyn PersistentCache>>,
}

impl CacheService {
    /// Façade over an already connected backend.
    pub fn new(backend: Arc<dyn PersistentCache>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Façade without persistence.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Connects the backend selected by `config`.
    ///
    /// A disabled backend yields a disabled façade; connection, schema and
    /// configuration failures are returned so the caller can decide to run
    /// without persistence.
    pub async fn from_config(config: &PersistentConfig) -> Result<Self> {
        Ok(Self {
            backend: connect_backend(config).await?,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Name of the active backend, `none` when disabled.
    pub fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map_or("none", |backend| backend.name())
    }

    // == Get ==
    pub async fn get(&self, key: &str) -> Option<String> {
        match &self.backend {
            Some(backend) => backend.get(key).await,
            None => None,
        }
    }

    // == Set ==
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        match &self.backend {
            Some(backend) => backend.set(key, value).await,
            None => Ok(()),
        }
    }

    pub async fn set_with_ref(&self, key: &str, value: &str, source_ref: Option<&str>) -> Result<()> {
        match &self.backend {
            Some(backend) => backend.set_with_ref(key, value, source_ref).await,
            None => Ok(()),
        }
    }

    // == Get All ==
    /// Live records for administrative listing; empty when disabled.
    pub async fn get_all(&self) -> Result<Vec<CacheRecord>> {
        match &self.backend {
            Some(backend) => backend.get_all().await,
            None => Ok(Vec::new()),
        }
    }

    // == Close ==
    pub async fn close(&self) {
        if let Some(backend) = &self.backend {
            backend.close().await;
        }
    }
}

impl fmt::Debug for CacheService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheService")
            .field("backend", &self.backend_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::normalize_key;
    use crate::config::BackendKind;
    use crate::error::CacheError;
    use crate::persistent::expiry_after;

    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Map-backed stand-in sharing the read-time expiry rule of the real stores.
    #[derive(Default)]
    struct MemoryBackend {
        records: Mutex<HashMap<String, CacheRecord>>,
        ttl: Duration,
        closed: Mutex<u32>,
    }

    #[async_trait]
    impl PersistentCache for MemoryBackend {
        fn name(&self) -> &'static str {
            "memory"
        }

        async fn ensure_schema(&self) -> Result<()> {
            Ok(())
        }

        async fn get(&self, key: &str) -> Option<String> {
            let records = self.records.lock();
            records
                .get(&normalize_key(key))
                .filter(|record| !record.is_expired_at(Utc::now()))
                .map(|record| record.value.clone())
        }

        async fn set_with_ref(&self, key: &str, value: &str, source_ref: Option<&str>) -> Result<()> {
            if *self.closed.lock() > 0 {
                return Err(CacheError::NotConnected);
            }
            let key = normalize_key(key);
            self.records.lock().insert(
                key.clone(),
                CacheRecord {
                    key,
                    value: value.to_string(),
                    expires_at: expiry_after(Utc::now(), self.ttl),
                    source_ref: source_ref.map(str::to_string),
                },
            );
            Ok(())
        }

        async fn get_all(&self) -> Result<Vec<CacheRecord>> {
            let now = Utc::now();
            Ok(self
                .records
                .lock()
                .values()
                .filter(|record| !record.is_expired_at(now))
                .cloned()
                .collect())
        }

        async fn close(&self) {
            *self.closed.lock() += 1;
        }
    }

    fn memory_service(ttl: Duration) -> (CacheService, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend {
            ttl,
            ..MemoryBackend::default()
        });
        (CacheService::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_disabled_service_degrades() {
        let service = CacheService::disabled();

        assert!(!service.is_enabled());
        assert_eq!(service.backend_name(), "none");
        assert!(service.set("hello", "world").await.is_ok());
        assert!(service.get("hello").await.is_none());
        assert!(service.get_all().await.unwrap().is_empty());
        service.close().await;
        service.close().await;
    }

    #[tokio::test]
    async fn test_missing_connection_target_leaves_service_usable() {
        let config = PersistentConfig {
            kind: BackendKind::Postgres,
            url: None,
            ..PersistentConfig::default()
        };

        let result = CacheService::from_config(&config).await;
        assert!(matches!(result, Err(CacheError::Config(_))));

        let service = result.unwrap_or_default();
        assert!(service.get("any key").await.is_none());
    }

    #[tokio::test]
    async fn test_from_config_disabled() {
        let service = CacheService::from_config(&PersistentConfig::default())
            .await
            .unwrap();
        assert!(!service.is_enabled());
    }

    #[tokio::test]
    async fn test_service_forwards_to_backend() {
        let (service, backend) = memory_service(Duration::from_secs(60));

        service.set(" Yesterday ", "all my troubles").await.unwrap();
        service
            .set_with_ref("Help", "I need somebody", Some("https://lyrics.example/help"))
            .await
            .unwrap();

        assert_eq!(service.backend_name(), "memory");
        assert_eq!(service.get("yesterday").await.as_deref(), Some("all my troubles"));

        let mut records = service.get_all().await.unwrap();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "help");
        assert_eq!(records[0].source_ref.as_deref(), Some("https://lyrics.example/help"));

        service.close().await;
        assert_eq!(*backend.closed.lock(), 1);
        assert!(matches!(
            service.set("late", "write").await,
            Err(CacheError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_expired_records_are_hidden() {
        let (service, _backend) = memory_service(Duration::from_millis(50));

        service.set("short", "lived").await.unwrap();
        assert!(service.get("short").await.is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(service.get("short").await.is_none());
        assert!(service.get_all().await.unwrap().is_empty());
    }
}
