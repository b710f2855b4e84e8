/*!
 * Worker Pool Manager
 * Categorized pools with one-shot auto-detected thread counts
 */

use super::pool::{PoolError, WorkerPool};
use crate::config::options::FactoryOptions;
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pool categories for rewrite work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPoolCategory {
    /// General rewrite work
    Rewrite,
    /// CPU-heavy optimizations that would starve the general pool
    ExpensiveRewrite,
}

/// Thread counts fixed for the remainder of the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadCounts {
    pub rewrite: usize,
    pub expensive_rewrite: usize,
}

impl ThreadCounts {
    /// Deterministic, monotonic function of detected hardware
    /// concurrency: repeated starts on identical hardware always size
    /// the pools identically.
    pub fn auto_detect(hardware_concurrency: usize) -> Self {
        let concurrency = hardware_concurrency.max(1);
        Self {
            rewrite: concurrency.div_ceil(2),
            expensive_rewrite: concurrency.div_ceil(4),
        }
    }

    fn with_overrides(self, options: &FactoryOptions) -> Self {
        Self {
            rewrite: options.num_rewrite_threads.unwrap_or(self.rewrite),
            expensive_rewrite: options
                .num_expensive_rewrite_threads
                .unwrap_or(self.expensive_rewrite),
        }
    }

    #[inline]
    fn for_category(&self, category: WorkerPoolCategory) -> usize {
        match category {
            WorkerPoolCategory::Rewrite => self.rewrite,
            WorkerPoolCategory::ExpensiveRewrite => self.expensive_rewrite,
        }
    }
}

/// Creates and sizes the process-wide worker pools.
///
/// Thread counts are finalized exactly once, before any pool exists;
/// requesting a pool earlier is a lifecycle ordering violation (assert
/// in debug builds, error return in release).
pub struct WorkerPoolManager {
    counts: Mutex<Option<ThreadCounts>>,
    pools: Mutex<Vec<Arc<WorkerPool>>>,
    slow_worker: Mutex<Option<Arc<WorkerPool>>>,
}

impl WorkerPoolManager {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(None),
            pools: Mutex::new(Vec::new()),
            slow_worker: Mutex::new(None),
        }
    }

    /// Fix thread counts for the process: auto-detected from hardware
    /// concurrency, then overridden by explicit configuration. A second
    /// call is a programming error and keeps the first counts.
    pub fn finalize_thread_counts(&self, options: &FactoryOptions) -> ThreadCounts {
        let detected = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.finalize_with_concurrency(options, detected)
    }

    /// Finalization entry point with explicit concurrency, used by tests
    /// to pin the detected value.
    pub fn finalize_with_concurrency(
        &self,
        options: &FactoryOptions,
        hardware_concurrency: usize,
    ) -> ThreadCounts {
        let mut counts = self.counts.lock();
        if let Some(existing) = *counts {
            debug_assert!(false, "thread counts finalized twice");
            warn!("Thread counts already finalized; keeping existing");
            return existing;
        }
        let finalized = ThreadCounts::auto_detect(hardware_concurrency).with_overrides(options);
        info!(
            "Finalized thread counts: {} rewrite, {} expensive rewrite",
            finalized.rewrite, finalized.expensive_rewrite
        );
        *counts = Some(finalized);
        finalized
    }

    #[inline]
    pub fn counts_finalized(&self) -> bool {
        self.counts.lock().is_some()
    }

    /// Create a categorized pool. Counts must be finalized first.
    pub fn create_pool(
        &self,
        category: WorkerPoolCategory,
        name: &str,
    ) -> Result<Arc<WorkerPool>, PoolError> {
        let counts = {
            let guard = self.counts.lock();
            match *guard {
                Some(counts) => counts,
                None => {
                    debug_assert!(false, "pool requested before thread counts finalized");
                    return Err(PoolError::CountsNotFinalized);
                }
            }
        };
        let pool = Arc::new(WorkerPool::spawn(name, counts.for_category(category))?);
        self.pools.lock().push(Arc::clone(&pool));
        Ok(pool)
    }

    /// Single background thread for low-priority deferred work, created
    /// lazily on first use.
    pub fn slow_worker(&self) -> Result<Arc<WorkerPool>, PoolError> {
        let mut slot = self.slow_worker.lock();
        if let Some(ref worker) = *slot {
            return Ok(Arc::clone(worker));
        }
        let worker = Arc::new(WorkerPool::spawn("slow-work", 1)?);
        *slot = Some(Arc::clone(&worker));
        Ok(worker)
    }

    /// Shut down every pool this manager created.
    pub fn shutdown_all(&self) {
        for pool in self.pools.lock().drain(..) {
            pool.shutdown();
        }
        if let Some(worker) = self.slow_worker.lock().take() {
            worker.shutdown();
        }
    }
}

impl Default for WorkerPoolManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::HostId;

    fn factory_options() -> FactoryOptions {
        FactoryOptions::new(HostId::from_identifier("server:80"))
    }

    #[test]
    fn auto_detect_is_pure_and_monotonic() {
        assert_eq!(
            ThreadCounts::auto_detect(8),
            ThreadCounts::auto_detect(8)
        );
        let mut previous = ThreadCounts::auto_detect(1);
        for concurrency in 2..=64 {
            let current = ThreadCounts::auto_detect(concurrency);
            assert!(current.rewrite >= previous.rewrite);
            assert!(current.expensive_rewrite >= previous.expensive_rewrite);
            previous = current;
        }
    }

    #[test]
    fn zero_concurrency_still_yields_workers() {
        let counts = ThreadCounts::auto_detect(0);
        assert!(counts.rewrite >= 1);
        assert!(counts.expensive_rewrite >= 1);
    }

    #[test]
    fn explicit_overrides_win() {
        let manager = WorkerPoolManager::new();
        let options = factory_options()
            .with_rewrite_threads(3)
            .with_expensive_rewrite_threads(2);
        let counts = manager.finalize_with_concurrency(&options, 16);
        assert_eq!(counts.rewrite, 3);
        assert_eq!(counts.expensive_rewrite, 2);
    }

    #[test]
    fn pool_before_finalization_is_rejected() {
        // debug_assert fires in debug builds; release-mode behavior is
        // the error return checked here
        if cfg!(debug_assertions) {
            return;
        }
        let manager = WorkerPoolManager::new();
        let result = manager.create_pool(WorkerPoolCategory::Rewrite, "early");
        assert!(matches!(result, Err(PoolError::CountsNotFinalized)));
    }

    #[test]
    fn pools_sized_per_category() {
        let manager = WorkerPoolManager::new();
        manager.finalize_with_concurrency(&factory_options(), 8);
        let rewrite = manager
            .create_pool(WorkerPoolCategory::Rewrite, "rewrite")
            .unwrap();
        let expensive = manager
            .create_pool(WorkerPoolCategory::ExpensiveRewrite, "expensive")
            .unwrap();
        assert_eq!(rewrite.thread_count(), 4);
        assert_eq!(expensive.thread_count(), 2);
        manager.shutdown_all();
    }
}
