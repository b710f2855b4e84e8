/*!
 * Remote Cache Tier
 * Memcached-style L2; failures degrade to misses, never block startup
 */

use super::traits::{CacheBackend, RemoteStore, Value};
use super::types::{CacheCounters, CacheError};
use crate::stats::SharedStats;
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Parse and validate a "host:port" endpoint list.
pub fn parse_endpoints(servers: &[String]) -> Result<Vec<String>, CacheError> {
    if servers.is_empty() {
        return Err(CacheError::InvalidEndpoint(
            "Empty server list".to_string(),
        ));
    }
    for server in servers {
        let Some((host, port)) = server.rsplit_once(':') else {
            return Err(CacheError::InvalidEndpoint(format!(
                "'{}' is not host:port",
                server
            )));
        };
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(CacheError::InvalidEndpoint(format!(
                "'{}' is not host:port",
                server
            )));
        }
    }
    Ok(servers.to_vec())
}

/// In-process remote store, the default when no real transport is wired
/// in. Keyed by the endpoint list so distinct server sets stay isolated.
pub struct InProcessStore {
    entries: DashMap<String, Value, RandomState>,
}

impl InProcessStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
        }
    }
}

impl Default for InProcessStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for InProcessStore {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// L2 tier over a remote store.
///
/// Construction never probes connectivity, so an unreachable remote
/// endpoint cannot block server startup; per-request failures surface as
/// misses and increment the error counter.
pub struct RemoteCache {
    servers: Vec<String>,
    store: Arc<dyn RemoteStore>,
    counters: Arc<CacheCounters>,
    shared: Option<Arc<SharedStats>>,
    healthy: AtomicBool,
}

impl RemoteCache {
    pub fn new(
        servers: &[String],
        store: Arc<dyn RemoteStore>,
        counters: Arc<CacheCounters>,
    ) -> Result<Self, CacheError> {
        let servers = parse_endpoints(servers)?;
        info!("Remote cache tier over [{}]", servers.join(", "));
        Ok(Self {
            servers,
            store,
            counters,
            shared: None,
            healthy: AtomicBool::new(true),
        })
    }

    /// Mirror remote errors into the shared statistics segment.
    #[must_use]
    pub fn with_shared_stats(mut self, stats: Arc<SharedStats>) -> Self {
        self.shared = Some(stats);
        self
    }

    #[inline]
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    fn record_failure(&self, op: &str, key: &str, err: &CacheError) {
        self.counters.record_remote_error();
        if let Some(ref shared) = self.shared {
            shared.add("remote_cache_errors", 1);
        }
        self.healthy.store(false, Ordering::Relaxed);
        warn!("Remote cache {} failed for '{}': {}", op, key, err);
    }
}

impl CacheBackend for RemoteCache {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn get(&self, key: &str) -> Option<Value> {
        match self.store.get(key) {
            Ok(value) => {
                self.healthy.store(true, Ordering::Relaxed);
                value
            }
            Err(e) => {
                self.record_failure("get", key, &e);
                None
            }
        }
    }

    fn put(&self, key: &str, value: Value) {
        if let Err(e) = self.store.put(key, &value) {
            self.record_failure("put", key, &e);
        } else {
            debug!("Remote put '{}' ({} bytes)", key, value.len());
        }
    }

    fn delete(&self, key: &str) {
        if let Err(e) = self.store.delete(key) {
            self.record_failure("delete", key, &e);
        }
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    impl RemoteStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
            Err(CacheError::Remote("connection refused".to_string()))
        }
        fn put(&self, _key: &str, _value: &[u8]) -> Result<(), CacheError> {
            Err(CacheError::Remote("connection refused".to_string()))
        }
        fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Remote("connection refused".to_string()))
        }
    }

    fn servers() -> Vec<String> {
        vec!["memcache1:11211".to_string()]
    }

    #[test]
    fn endpoint_validation() {
        assert!(parse_endpoints(&servers()).is_ok());
        assert!(parse_endpoints(&["nocolon".to_string()]).is_err());
        assert!(parse_endpoints(&["host:notaport".to_string()]).is_err());
        assert!(parse_endpoints(&[]).is_err());
    }

    #[test]
    fn failures_become_misses_and_count() {
        let counters = Arc::new(CacheCounters::new());
        let cache =
            RemoteCache::new(&servers(), Arc::new(FailingStore), Arc::clone(&counters)).unwrap();

        // Construction succeeded despite the store being dead
        assert_eq!(cache.get("k"), None);
        cache.put("k", b"v".to_vec());
        assert_eq!(counters.snapshot().remote_errors, 2);
        assert!(!cache.is_healthy());
    }

    #[test]
    fn round_trip_through_in_process_store() {
        let counters = Arc::new(CacheCounters::new());
        let cache =
            RemoteCache::new(&servers(), Arc::new(InProcessStore::new()), counters).unwrap();
        cache.put("k", b"v".to_vec());
        assert_eq!(cache.get("k"), Some(b"v".to_vec()));
        assert!(cache.is_healthy());
    }
}
