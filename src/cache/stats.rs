/*!
 * Statistics Cache Decorator
 * Counts hits/misses/bytes without altering cache semantics
 */

use super::traits::{CacheBackend, Value};
use super::types::CacheCounters;
use crate::stats::SharedStats;
use std::sync::Arc;

/// Outermost decorator of every tiered cache.
///
/// Updates the per-cache counters and, when wired, mirrors them into the
/// shared statistics segment so the whole server aggregates.
pub struct StatsCache {
    inner: Arc<dyn CacheBackend>,
    counters: Arc<CacheCounters>,
    shared: Option<Arc<SharedStats>>,
}

impl StatsCache {
    pub fn new(
        inner: Arc<dyn CacheBackend>,
        counters: Arc<CacheCounters>,
        shared: Option<Arc<SharedStats>>,
    ) -> Self {
        Self {
            inner,
            counters,
            shared,
        }
    }

    #[inline]
    pub fn counters(&self) -> &Arc<CacheCounters> {
        &self.counters
    }

    fn record_lookup(&self, hit: bool) {
        if hit {
            self.counters.record_hit();
        } else {
            self.counters.record_miss();
        }
        if let Some(ref shared) = self.shared {
            shared.add(if hit { "cache_hits" } else { "cache_misses" }, 1);
        }
    }
}

impl CacheBackend for StatsCache {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn get(&self, key: &str) -> Option<Value> {
        let result = self.inner.get(key);
        self.record_lookup(result.is_some());
        result
    }

    fn put(&self, key: &str, value: Value) {
        self.counters.record_insert(value.len());
        if let Some(ref shared) = self.shared {
            shared.add("cache_inserted_bytes", value.len() as u64);
        }
        self.inner.put(key, value);
    }

    fn delete(&self, key: &str) {
        self.inner.delete(key);
    }

    fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::remote::{InProcessStore, RemoteCache};

    #[test]
    fn counts_without_changing_semantics() {
        let counters = Arc::new(CacheCounters::new());
        let backend = RemoteCache::new(
            &["memcache1:11211".to_string()],
            Arc::new(InProcessStore::new()),
            Arc::clone(&counters),
        )
        .unwrap();
        let cache = StatsCache::new(
            Arc::new(backend) as Arc<dyn CacheBackend>,
            Arc::clone(&counters),
            None,
        );

        assert_eq!(cache.get("k"), None);
        cache.put("k", b"value".to_vec());
        assert_eq!(cache.get("k"), Some(b"value".to_vec()));

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.inserted_bytes, 5);
    }
}
