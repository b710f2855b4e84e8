/*!
 * Asynchronous Cache Decorator
 * Non-blocking lookups completed via callback on a dedicated worker
 */

use super::batcher::BatchingCache;
use super::traits::{CacheBackend, LookupCallback, Value};
use super::types::CacheError;
use crossbeam_channel::{unbounded, Sender};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

struct LookupJob {
    key: String,
    /// Liveness of the owning configuration; cleared at teardown so a
    /// late completion never touches destroyed state
    live: Arc<AtomicBool>,
    callback: LookupCallback,
}

/// Decorator that turns lookups into non-blocking operations.
///
/// `initiate_lookup` enqueues the job and returns immediately; a
/// dedicated worker thread performs the (batched) backend get and runs
/// the callback. Jobs whose owning configuration died in the meantime
/// are dropped without invoking the callback.
pub struct AsyncCache {
    batcher: Arc<BatchingCache>,
    sender: Mutex<Option<Sender<LookupJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    accepting: AtomicBool,
}

impl AsyncCache {
    pub fn new(batcher: Arc<BatchingCache>, name: &str) -> Result<Self, CacheError> {
        let (sender, receiver) = unbounded::<LookupJob>();
        let worker_batcher = Arc::clone(&batcher);
        let thread_name = format!("async-cache-{}", name);
        let worker = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    if !job.live.load(Ordering::Acquire) {
                        debug!("Dropping lookup for '{}': owner torn down", job.key);
                        continue;
                    }
                    // Liveness is re-checked at completion: teardown may
                    // land while the backend get is in flight, and a late
                    // callback must not touch destroyed state
                    let live = Arc::clone(&job.live);
                    let callback = job.callback;
                    worker_batcher.lookup(
                        &job.key,
                        Box::new(move |result| {
                            if live.load(Ordering::Acquire) {
                                callback(result);
                            }
                        }),
                    );
                }
                debug!("Async cache worker exiting");
            })
            .map_err(|e| {
                CacheError::BackingStore(format!("failed to spawn {}: {}", thread_name, e))
            })?;

        Ok(Self {
            batcher,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            accepting: AtomicBool::new(true),
        })
    }

    /// Issue a non-blocking lookup. The callback runs on the worker
    /// thread, and only if `live` is still set when the job is serviced.
    /// Lookups from a torn-down owner are dropped outright; after
    /// [`stop_activity`](Self::stop_activity) live lookups complete
    /// immediately as misses.
    pub fn initiate_lookup(&self, key: &str, live: Arc<AtomicBool>, callback: LookupCallback) {
        if !live.load(Ordering::Acquire) {
            debug!("Dropping lookup for '{}': owner torn down", key);
            return;
        }
        if !self.accepting.load(Ordering::Acquire) {
            callback(None);
            return;
        }
        let job = LookupJob {
            key: key.to_string(),
            live,
            callback,
        };
        let sender = self.sender.lock().clone();
        match sender {
            Some(ref tx) => {
                if let Err(err) = tx.send(job) {
                    // Worker already gone; complete as a miss
                    debug!("Async cache worker unavailable for '{}'", key);
                    (err.0.callback)(None);
                }
            }
            None => (job.callback)(None),
        }
    }

    /// Stop accepting new asynchronous work; pending jobs drain on the
    /// worker. Invoked ahead of shutdown so teardown cannot race fresh
    /// lookups.
    pub fn stop_activity(&self) {
        if self.accepting.swap(false, Ordering::AcqRel) {
            info!("Async cache activity stopped");
        }
    }

    /// Drain the queue and join the worker thread.
    pub fn shutdown(&self) {
        self.stop_activity();
        let sender = self.sender.lock().take();
        drop(sender);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

impl CacheBackend for AsyncCache {
    fn name(&self) -> &'static str {
        "async"
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.batcher.get(key)
    }

    fn put(&self, key: &str, value: Value) {
        self.batcher.put(key, value);
    }

    fn delete(&self, key: &str) {
        self.batcher.delete(key);
    }

    fn is_healthy(&self) -> bool {
        self.batcher.is_healthy()
    }
}

impl Drop for AsyncCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::remote::InProcessStore;
    use crate::cache::remote::RemoteCache;
    use crate::cache::types::CacheCounters;
    use crossbeam_channel::bounded;

    fn async_cache() -> AsyncCache {
        let counters = Arc::new(CacheCounters::new());
        let remote = RemoteCache::new(
            &["memcache1:11211".to_string()],
            Arc::new(InProcessStore::new()),
            counters,
        )
        .unwrap();
        let batcher = Arc::new(BatchingCache::new(Arc::new(remote) as Arc<dyn CacheBackend>));
        AsyncCache::new(batcher, "test").unwrap()
    }

    #[test]
    fn lookup_completes_on_worker() {
        let cache = async_cache();
        cache.put("k", b"v".to_vec());

        let (tx, rx) = bounded(1);
        let live = Arc::new(AtomicBool::new(true));
        cache.initiate_lookup(
            "k",
            live,
            Box::new(move |result| {
                tx.send(result).unwrap();
            }),
        );

        assert_eq!(rx.recv().unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn dead_owner_callback_is_never_invoked() {
        let cache = async_cache();
        cache.put("k", b"v".to_vec());

        let invoked = Arc::new(AtomicBool::new(false));
        let invoked_clone = Arc::clone(&invoked);
        let live = Arc::new(AtomicBool::new(false)); // torn down already
        cache.initiate_lookup(
            "k",
            live,
            Box::new(move |_| {
                invoked_clone.store(true, Ordering::SeqCst);
            }),
        );

        cache.shutdown();
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[test]
    fn stopped_cache_completes_as_miss() {
        let cache = async_cache();
        cache.put("k", b"v".to_vec());
        cache.stop_activity();

        let (tx, rx) = bounded(1);
        let live = Arc::new(AtomicBool::new(true));
        cache.initiate_lookup(
            "k",
            live,
            Box::new(move |result| {
                tx.send(result).unwrap();
            }),
        );

        assert_eq!(rx.recv().unwrap(), None);
    }
}
