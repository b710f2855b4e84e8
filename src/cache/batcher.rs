/*!
 * Batching Cache Decorator
 * Coalesces outstanding lookups for the same key into one backend get
 */

use super::traits::{CacheBackend, LookupCallback, Value};
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Decorator that coalesces concurrent gets for one key.
///
/// The first lookup for a key performs the backend get; lookups arriving
/// while it is outstanding only register a callback and are completed
/// with the same result. Puts and deletes pass straight through.
pub struct BatchingCache {
    inner: Arc<dyn CacheBackend>,
    pending: Mutex<HashMap<String, Vec<LookupCallback>>>,
    coalesced: AtomicU64,
}

impl BatchingCache {
    pub fn new(inner: Arc<dyn CacheBackend>) -> Self {
        Self {
            inner,
            pending: Mutex::new(HashMap::new()),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Lookups coalesced onto an earlier outstanding get
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    /// Look up `key`, delivering the result through `callback`. May
    /// invoke the callback on the calling thread or on whichever thread
    /// performed the coalesced backend get.
    pub fn lookup(&self, key: &str, callback: LookupCallback) {
        {
            let mut pending = self.pending.lock();
            if let Some(waiters) = pending.get_mut(key) {
                waiters.push(callback);
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!("Coalesced lookup for '{}'", key);
                return;
            }
            pending.insert(key.to_string(), vec![callback]);
        }

        let result = self.inner.get(key);

        let waiters = self
            .pending
            .lock()
            .remove(key)
            .unwrap_or_default();
        for waiter in waiters {
            waiter(result.clone());
        }
    }
}

impl CacheBackend for BatchingCache {
    fn name(&self) -> &'static str {
        "batching"
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: Value) {
        self.inner.put(key, value);
    }

    fn delete(&self, key: &str) {
        self.inner.delete(key);
    }

    fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }
}
