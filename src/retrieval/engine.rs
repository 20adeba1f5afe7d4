//! Single-zone retrieval engine (`spec.md` §4.7).
//!
//! Owns one back-end handle, a bounded LRU index cache, and an optional
//! extended-retention overlay. `get` is the only public entry point; the
//! index cache is the sole shared mutable state (`spec.md` §5), guarded by
//! `parking_lot::RwLock` the way `harborgrid-justin-caddy` guards its own
//! shared maps.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::RwLock;

use crate::backend::Backend;
use crate::config::{RetrievalConfig, RouterConfig, StorageConfig};
use crate::error::DesArcError;
use crate::retention::RetentionManager;
use crate::router::locate;
use crate::shard::reader::{fetch_index, fetch_payload, ParsedIndex};
use crate::shard::format::FORMAT_V2;

struct CacheEntry {
    index: Arc<ParsedIndex>,
    inserted_at: Instant,
}

struct IndexCache {
    inner: RwLock<LruCache<String, CacheEntry>>,
    max_bytes: u64,
    ttl: Option<Duration>,
}

impl IndexCache {
    fn new(cfg: &RetrievalConfig) -> Self {
        let cap = NonZeroUsize::new(cfg.index_cache_entries.max(1)).expect("nonzero");
        Self {
            inner: RwLock::new(LruCache::new(cap)),
            max_bytes: cfg.index_cache_max_bytes,
            ttl: cfg.index_cache_ttl_secs.map(Duration::from_secs),
        }
    }

    fn get(&self, key: &str) -> Option<Arc<ParsedIndex>> {
        let mut guard = self.inner.write();
        let hit = guard.get(key)?;
        if let Some(ttl) = self.ttl {
            if hit.inserted_at.elapsed() > ttl {
                guard.pop(key);
                return None;
            }
        }
        Some(hit.index.clone())
    }

    fn put(&self, key: String, index: Arc<ParsedIndex>) {
        let mut guard = self.inner.write();
        guard.put(key, CacheEntry { index, inserted_at: Instant::now() });
        while Self::total_bytes(&guard) > self.max_bytes && guard.len() > 1 {
            guard.pop_lru();
        }
    }

    fn total_bytes(guard: &LruCache<String, CacheEntry>) -> u64 {
        guard.iter().map(|(_, e)| e.index.estimated_bytes() as u64).sum()
    }

    #[allow(dead_code)]
    fn evict(&self, key: &str) {
        self.inner.write().pop(key);
    }
}

pub struct RetrievalEngine {
    backend: Arc<dyn Backend>,
    router_cfg: RouterConfig,
    storage_cfg: StorageConfig,
    cache: IndexCache,
    overlay: Option<Arc<RetentionManager>>,
}

impl RetrievalEngine {
    pub fn new(
        backend: Arc<dyn Backend>,
        router_cfg: RouterConfig,
        storage_cfg: StorageConfig,
        retrieval_cfg: RetrievalConfig,
        overlay: Option<Arc<RetentionManager>>,
    ) -> Self {
        Self {
            backend,
            router_cfg,
            storage_cfg,
            cache: IndexCache::new(&retrieval_cfg),
            overlay,
        }
    }

    /// `spec.md` §4.7: overlay probe, then router, then shard reader with
    /// the index cache.
    pub async fn get(&self, uid: &[u8], created_at: DateTime<Utc>) -> Result<Vec<u8>, DesArcError> {
        if let Some(overlay) = &self.overlay {
            if let Some(bytes) = overlay.probe(uid, created_at).await? {
                return Ok(bytes.to_vec());
            }
        }

        let loc = locate(uid, created_at, self.router_cfg.n_bits)?;

        if let Some(index) = self.cache.get(&loc.object_key) {
            return fetch_payload(self.backend.as_ref(), &loc.object_key, &self.storage_cfg.bigfiles_prefix, &index, uid).await;
        }

        let index = Arc::new(fetch_index(self.backend.as_ref(), &loc.object_key, FORMAT_V2).await?);
        self.cache.put(loc.object_key.clone(), index.clone());
        fetch_payload(self.backend.as_ref(), &loc.object_key, &self.storage_cfg.bigfiles_prefix, &index, uid).await
    }

    /// Exposed for tests and for the extended-retention manager's teardown
    /// of a stale cached index after a shard is superseded.
    pub fn evict_cached_index(&self, object_key: &str) {
        self.cache.evict(object_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::LocalBackend;
    use crate::codec::CodecId;
    use crate::config::CompressionConfig;
    use crate::shard::writer::ShardWriter;
    use chrono::TimeZone;

    async fn seed(dir: &std::path::Path, n_bits: u8) -> (Arc<LocalBackend>, RouterConfig, StorageConfig) {
        let backend = Arc::new(LocalBackend::new(dir));
        let comp = CompressionConfig { codec: CodecId::None, level: 0, min_size_bytes: 0, min_ratio: 1.1, skip_extensions: vec![] };
        let storage = StorageConfig { bigfile_threshold_bytes: 1 << 30, bigfiles_prefix: "_bigFiles".into(), overlay_prefix: "_ext_retention".into(), max_shard_size_bytes: 1 << 30 };
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let loc = locate(b"uid-1", t, n_bits).unwrap();
        let mut w = ShardWriter::open(backend.clone(), loc.object_key, comp, storage.clone());
        w.append(b"uid-1", b"a", vec![]).await.unwrap();
        w.append(b"uid-2", b"bb", vec![]).await.unwrap();
        w.close().await.unwrap();
        (backend, RouterConfig { n_bits }, storage)
    }

    #[tokio::test]
    async fn get_resolves_through_router_and_shard_reader() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, router_cfg, storage) = seed(dir.path(), 8).await;
        let engine = RetrievalEngine::new(backend, router_cfg, storage, RetrievalConfig::default(), None);
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let bytes = engine.get(b"uid-2", t).await.unwrap();
        assert_eq!(bytes, b"bb");
    }

    #[tokio::test]
    async fn second_read_from_same_shard_hits_warm_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, router_cfg, storage) = seed(dir.path(), 8).await;
        let engine = RetrievalEngine::new(backend, router_cfg, storage, RetrievalConfig::default(), None);
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        engine.get(b"uid-1", t).await.unwrap();
        let bytes = engine.get(b"uid-2", t).await.unwrap();
        assert_eq!(bytes, b"bb");
    }

    #[tokio::test]
    async fn overlay_short_circuits_shard_read() {
        let dir = tempfile::tempdir().unwrap();
        let overlay_dir = tempfile::tempdir().unwrap();
        let (backend, router_cfg, storage) = seed(dir.path(), 8).await;
        let overlay_backend = Arc::new(LocalBackend::new(overlay_dir.path()));
        let mgr = Arc::new(RetentionManager::new(
            backend.clone(), overlay_backend, "_ext_retention", "_bigFiles", 8,
        ));
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let future = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        mgr.set_retention(b"uid-1", t, future).await.unwrap();

        let engine = RetrievalEngine::new(backend, router_cfg, storage, RetrievalConfig::default(), Some(mgr));
        let bytes = engine.get(b"uid-1", t).await.unwrap();
        assert_eq!(bytes, b"a");
    }
}
