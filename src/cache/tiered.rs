/*!
 * Tiered Cache
 * Bottom-up composition of shm, remote, batching, async and stats tiers
 */

use super::async_cache::AsyncCache;
use super::batcher::BatchingCache;
use super::remote::{InProcessStore, RemoteCache};
use super::shm_cache::ShmCache;
use super::stats::StatsCache;
use super::traits::{CacheBackend, LookupCallback, RemoteStore, Value};
use super::types::{CacheCounters, CacheError};
use crate::config::options::VhostOptions;
use crate::config::signature::{cache_signature, ConfigurationSignature};
use crate::core::types::Size;
use crate::shm::runtime::SharedSegmentRuntime;
use crate::stats::SharedStats;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Routing core of a tiered cache: L1 first, remote on miss, large
/// values bypass the fixed shared-memory budget.
struct ComposedCache {
    local: Arc<ShmCache>,
    remote: Option<Arc<AsyncCache>>,
    large_value_threshold: Size,
}

impl CacheBackend for ComposedCache {
    fn name(&self) -> &'static str {
        "tiered"
    }

    fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.local.get(key) {
            return Some(value);
        }
        let value = self.remote.as_ref()?.get(key)?;
        // Promote remote hits that fit the local budget
        if value.len() <= self.large_value_threshold {
            self.local.put(key, value.clone());
        }
        Some(value)
    }

    fn put(&self, key: &str, value: Value) {
        if value.len() > self.large_value_threshold {
            // Keep big values out of the fixed shm budget when a remote
            // tier can hold them
            match self.remote.as_ref() {
                Some(remote) => remote.put(key, value),
                None => self.local.put(key, value),
            }
            return;
        }
        self.local.put(key, value.clone());
        if let Some(ref remote) = self.remote {
            remote.put(key, value);
        }
    }

    fn delete(&self, key: &str) {
        self.local.delete(key);
        if let Some(ref remote) = self.remote {
            remote.delete(key);
        }
    }

    fn is_healthy(&self) -> bool {
        self.remote.as_ref().map_or(true, |r| r.is_healthy())
    }
}

/// One logical cache per distinct cache configuration signature.
///
/// Owned by the resource registry; callers hold non-owning `Arc` clones
/// valid for the lifetime of the owning configuration.
pub struct TieredCache {
    signature: ConfigurationSignature,
    local: Arc<ShmCache>,
    remote: Option<Arc<AsyncCache>>,
    backend: StatsCache,
    counters: Arc<CacheCounters>,
}

impl TieredCache {
    /// Build all tiers for `options`, using the default in-process
    /// remote store when a remote endpoint list is configured.
    pub fn new(
        runtime: &SharedSegmentRuntime,
        options: &VhostOptions,
        shared_stats: Option<Arc<SharedStats>>,
    ) -> Result<Self, CacheError> {
        Self::with_remote_store(runtime, options, Arc::new(InProcessStore::new()), shared_stats)
    }

    /// As [`new`](Self::new), with an explicit remote transport.
    pub fn with_remote_store(
        runtime: &SharedSegmentRuntime,
        options: &VhostOptions,
        store: Arc<dyn RemoteStore>,
        shared_stats: Option<Arc<SharedStats>>,
    ) -> Result<Self, CacheError> {
        let signature = cache_signature(options);
        let counters = Arc::new(CacheCounters::new());

        let segment_name = signature.to_string();
        let local = Arc::new(ShmCache::new(
            runtime,
            &segment_name,
            options.cache_byte_budget,
        )?);

        let remote = if options.has_remote_cache() {
            let mut remote_tier =
                RemoteCache::new(&options.remote_servers, store, Arc::clone(&counters))?;
            if let Some(ref stats) = shared_stats {
                remote_tier = remote_tier.with_shared_stats(Arc::clone(stats));
            }
            let batcher = Arc::new(BatchingCache::new(
                Arc::new(remote_tier) as Arc<dyn CacheBackend>
            ));
            Some(Arc::new(AsyncCache::new(batcher, options.host.as_str())?))
        } else {
            None
        };

        let composed = ComposedCache {
            local: Arc::clone(&local),
            remote: remote.clone(),
            large_value_threshold: options.large_value_threshold,
        };
        let backend = StatsCache::new(
            Arc::new(composed) as Arc<dyn CacheBackend>,
            Arc::clone(&counters),
            shared_stats,
        );

        info!(
            "Built tiered cache for signature '{}' (remote: {})",
            signature,
            if remote.is_some() { "yes" } else { "no" }
        );

        Ok(Self {
            signature,
            local,
            remote,
            backend,
            counters,
        })
    }

    #[inline]
    pub fn signature(&self) -> &ConfigurationSignature {
        &self.signature
    }

    #[inline]
    pub fn counters(&self) -> &Arc<CacheCounters> {
        &self.counters
    }

    pub fn used_local_bytes(&self) -> Size {
        self.local.used_bytes()
    }

    /// Issue a non-blocking lookup against the remote chain. The L1 tier
    /// is consulted synchronously first; a hit completes the callback on
    /// the calling thread.
    pub fn initiate_lookup(&self, key: &str, live: Arc<AtomicBool>, callback: LookupCallback) {
        if !live.load(Ordering::Acquire) {
            return;
        }
        if let Some(value) = self.local.get(key) {
            self.counters.record_hit();
            callback(Some(value));
            return;
        }
        match self.remote.as_ref() {
            Some(remote) => {
                let counters = Arc::clone(&self.counters);
                remote.initiate_lookup(
                    key,
                    live,
                    Box::new(move |result| {
                        if result.is_some() {
                            counters.record_hit();
                        } else {
                            counters.record_miss();
                        }
                        callback(result);
                    }),
                );
            }
            None => {
                self.counters.record_miss();
                callback(None);
            }
        }
    }

    /// Quiesce asynchronous activity ahead of shutdown.
    pub fn stop_activity(&self) {
        if let Some(ref remote) = self.remote {
            remote.stop_activity();
        }
    }

    /// Tear down the cache: join the async worker and free the backing
    /// segment if this instance created it. Called exactly once, by the
    /// registry, when the last referring configuration is released.
    pub fn shutdown(&self, runtime: &SharedSegmentRuntime) {
        if let Some(ref remote) = self.remote {
            remote.shutdown();
        }
        if self.local.handle().is_owner() {
            if let Err(e) = runtime.destroy(self.local.handle()) {
                warn!(
                    "Failed to destroy cache segment for '{}': {}",
                    self.signature, e
                );
            }
        }
    }
}

impl CacheBackend for TieredCache {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.backend.get(key)
    }

    fn put(&self, key: &str, value: Value) {
        self.backend.put(key, value);
    }

    fn delete(&self, key: &str) {
        self.backend.delete(key);
    }

    fn is_healthy(&self) -> bool {
        self.backend.is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::HostId;

    fn options(path: &str) -> VhostOptions {
        VhostOptions::new(HostId::from_identifier("a.example:80"), path)
            .with_byte_budget(1024)
            .with_large_value_threshold(64)
    }

    #[test]
    fn local_only_round_trip() {
        let runtime = SharedSegmentRuntime::new();
        let cache = TieredCache::new(&runtime, &options("/var/cache/a"), None).unwrap();
        cache.put("k", b"v".to_vec());
        assert_eq!(cache.get("k"), Some(b"v".to_vec()));
        assert_eq!(cache.counters().snapshot().hits, 1);
    }

    #[test]
    fn large_values_route_to_remote() {
        let runtime = SharedSegmentRuntime::new();
        let opts = options("/var/cache/a").with_remote_servers(vec!["mc:11211".into()]);
        let cache = TieredCache::new(&runtime, &opts, None).unwrap();

        cache.put("big", vec![0u8; 128]);
        assert_eq!(cache.used_local_bytes(), 0);
        // Still retrievable through the remote tier
        assert_eq!(cache.get("big"), Some(vec![0u8; 128]));
    }

    #[test]
    fn remote_hit_promotes_into_local() {
        let runtime = SharedSegmentRuntime::new();
        let store = Arc::new(InProcessStore::new());
        let opts = options("/var/cache/a").with_remote_servers(vec!["mc:11211".into()]);
        let cache =
            TieredCache::with_remote_store(&runtime, &opts, store.clone(), None).unwrap();

        store.put("warm", b"value").unwrap();
        assert_eq!(cache.get("warm"), Some(b"value".to_vec()));
        assert_eq!(cache.used_local_bytes(), 5);
    }

    #[test]
    fn missing_key_counts_miss() {
        let runtime = SharedSegmentRuntime::new();
        let cache = TieredCache::new(&runtime, &options("/var/cache/a"), None).unwrap();
        assert_eq!(cache.get("absent"), None);
        assert_eq!(cache.counters().snapshot().misses, 1);
    }
}
