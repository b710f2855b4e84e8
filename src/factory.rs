/*!
 * Resource Factory
 * Builds and shares caches, fetchers and worker pools across vhosts
 */

use crate::cache::traits::RemoteStore;
use crate::cache::tiered::TieredCache;
use crate::config::options::{FactoryOptions, VhostOptions};
use crate::config::signature::{cache_signature, message_buffer_signature};
use crate::context::ServerContext;
use crate::core::errors::{FactoryError, FactoryResult};
use crate::core::types::HostId;
use crate::fetch::fetcher::{FetchTransport, Fetcher, RateLimitedFetcher};
use crate::fetch::pool::FetcherPool;
use crate::lifecycle::coordinator::ProcessLifecycleCoordinator;
use crate::lifecycle::types::ProcessState;
use crate::registry::registry::ResourceRegistry;
use crate::shm::circular::SharedCircularBuffer;
use crate::shm::runtime::SharedSegmentRuntime;
use crate::stats::SharedStats;
use crate::workers::manager::{WorkerPoolCategory, WorkerPoolManager};
use crate::workers::pool::WorkerPool;
use ahash::RandomState;
use dashmap::DashMap;
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Process-lifecycle-aware factory for the shared resources of one
/// server instance.
///
/// The first process to start runs [`root_init`](Self::root_init),
/// creating shared segments and global statistics; each worker process
/// runs [`child_init`](Self::child_init), attaching to those segments
/// and starting thread pools. Per-vhost callers then request caches,
/// fetchers and pools, which are shared through signature-keyed
/// registries instead of duplicated per host.
///
/// All process-wide state is owned here and passed down explicitly, so
/// multiple independent factories (and tests) can coexist in a process.
pub struct ResourceFactory {
    options: FactoryOptions,
    runtime: Arc<SharedSegmentRuntime>,
    coordinator: ProcessLifecycleCoordinator,
    caches: ResourceRegistry<TieredCache>,
    message_buffers: ResourceRegistry<SharedCircularBuffer>,
    fetchers: FetcherPool,
    workers: WorkerPoolManager,
    global_stats: Mutex<Option<Arc<SharedStats>>>,
    vhost_stats: DashMap<HostId, Arc<SharedStats>, RandomState>,
    contexts: Mutex<HashMap<HostId, Arc<ServerContext>>>,
    remote_store: Mutex<Option<Arc<dyn RemoteStore>>>,
}

impl ResourceFactory {
    /// Build a factory over the server's segment namespace and origin
    /// transport. No shared resources exist until `root_init` runs.
    pub fn new(
        options: FactoryOptions,
        runtime: Arc<SharedSegmentRuntime>,
        transport: Arc<dyn FetchTransport>,
    ) -> Self {
        Self {
            options,
            runtime,
            coordinator: ProcessLifecycleCoordinator::new(),
            caches: ResourceRegistry::new("cache"),
            message_buffers: ResourceRegistry::new("messages"),
            fetchers: FetcherPool::new(transport),
            workers: WorkerPoolManager::new(),
            global_stats: Mutex::new(None),
            vhost_stats: DashMap::with_hasher(RandomState::new()),
            contexts: Mutex::new(HashMap::new()),
            remote_store: Mutex::new(None),
        }
    }

    /// Use an explicit remote cache transport for every cache built from
    /// now on, instead of the per-cache in-process default.
    #[must_use]
    pub fn with_remote_store(self, store: Arc<dyn RemoteStore>) -> Self {
        *self.remote_store.lock() = Some(store);
        self
    }

    #[inline]
    pub fn options(&self) -> &FactoryOptions {
        &self.options
    }

    #[inline]
    pub fn state(&self) -> ProcessState {
        self.coordinator.state()
    }

    #[inline]
    pub fn is_root_process(&self) -> bool {
        self.coordinator.is_root_process()
    }

    #[inline]
    pub fn shared_segment_runtime(&self) -> &Arc<SharedSegmentRuntime> {
        &self.runtime
    }

    // ---- process lifecycle ------------------------------------------------

    /// One-time shared resource creation, run by the first process of
    /// the server instance. A later `child_init` in the same process is
    /// legal and overrides root status.
    pub fn root_init(&self) -> FactoryResult<()> {
        self.coordinator.transition(ProcessState::RootInitialized)?;

        let host = self.options.hostname_identifier.clone();
        let buffer = Arc::new(SharedCircularBuffer::create(
            &self.runtime,
            &host.segment_name("messages"),
            self.options.message_buffer_size,
        )?);
        self.message_buffers
            .register(message_buffer_signature(host.as_str()), &host, buffer);

        let stats = Arc::new(SharedStats::create(
            &self.runtime,
            &host.segment_name("statistics"),
        )?);
        self.fetchers.set_stats(Arc::clone(&stats));
        *self.global_stats.lock() = Some(stats);

        info!("Root init complete for '{}'", host);
        Ok(())
    }

    /// Worker-process startup: attach to the root's segments, finalize
    /// thread counts, start pools, and run deferred initialization for
    /// every context created before this point.
    pub fn child_init(&self) -> FactoryResult<()> {
        self.coordinator.transition(ProcessState::ChildInitialized)?;

        let host = self.options.hostname_identifier.clone();

        // When fork made this process see root_init too, the owning
        // handles are already in place; otherwise attach.
        {
            let mut stats = self.global_stats.lock();
            if stats.is_none() {
                *stats = Some(Arc::new(SharedStats::attach(
                    &self.runtime,
                    &host.segment_name("statistics"),
                )?));
            }
        }
        if self
            .message_buffers
            .lookup(&message_buffer_signature(host.as_str()))
            .is_none()
        {
            let buffer = Arc::new(SharedCircularBuffer::attach(
                &self.runtime,
                &host.segment_name("messages"),
            )?);
            self.message_buffers
                .register(message_buffer_signature(host.as_str()), &host, buffer);
        }
        if let Some(ref stats) = *self.global_stats.lock() {
            self.fetchers.set_stats(Arc::clone(stats));
        }

        // Thread counts are fixed here, after any forking is done
        if !self.workers.counts_finalized() {
            self.workers.finalize_thread_counts(&self.options);
        }
        self.workers.slow_worker()?;

        for context in self.coordinator.take_uninitialized() {
            self.child_init_context(&context)?;
        }

        info!("Child init complete for '{}'", host);
        Ok(())
    }

    fn child_init_context(&self, context: &Arc<ServerContext>) -> FactoryResult<()> {
        let host = context.host().clone();

        if self.options.use_per_vhost_statistics {
            let stats = Arc::new(SharedStats::open(
                &self.runtime,
                &host.segment_name("statistics"),
            )?);
            self.vhost_stats.insert(host.clone(), stats);
        }

        let signature = message_buffer_signature(host.as_str());
        let runtime = Arc::clone(&self.runtime);
        let size = self.options.message_buffer_size;
        let name = host.segment_name("messages");
        self.message_buffers
            .get_or_try_insert_with(signature, &host, || {
                SharedCircularBuffer::open(&runtime, &name, size).map(Arc::new)
            })?;

        context.mark_child_initialized();
        info!("Context '{}' child-initialized", host);
        Ok(())
    }

    /// Release everything this factory owns. Safe to call when some
    /// sub-resources were never initialized; contexts no child process
    /// ever claimed (root-only shutdown) are destroyed directly here.
    pub fn shutdown(&self) -> FactoryResult<()> {
        if self.state() == ProcessState::ShutDown {
            return Ok(());
        }
        self.coordinator.transition(ProcessState::ShutDown)?;

        self.stop_cache_activity();

        // Contexts never child-initialized: only the root can hold any,
        // and no child will ever claim them
        for context in self.coordinator.take_uninitialized() {
            warn!(
                "Destroying never-initialized context '{}' at shutdown",
                context.host()
            );
            self.teardown_context(&context);
        }
        let remaining: Vec<_> = {
            let mut contexts = self.contexts.lock();
            contexts.drain().map(|(_, ctx)| ctx).collect()
        };
        for context in remaining {
            self.teardown_context(&context);
        }

        // Whatever survived context teardown (e.g. the factory-global
        // message buffer) goes now, exactly once per resource
        for cache in self.caches.drain() {
            cache.shutdown(&self.runtime);
        }
        for buffer in self.message_buffers.drain() {
            self.destroy_buffer(&buffer);
        }

        self.fetchers.shutdown_all();
        self.workers.shutdown_all();

        if let Some(stats) = self.global_stats.lock().take() {
            if stats.is_owner() {
                if let Err(e) = self.runtime.destroy(stats.handle()) {
                    warn!("Failed to destroy statistics segment: {}", e);
                }
            }
        }
        for entry in self.vhost_stats.iter() {
            let stats = entry.value();
            if stats.is_owner() {
                if let Err(e) = self.runtime.destroy(stats.handle()) {
                    warn!("Failed to destroy vhost statistics segment: {}", e);
                }
            }
        }
        self.vhost_stats.clear();

        info!("Factory shut down");
        Ok(())
    }

    // ---- server contexts --------------------------------------------------

    /// Create the runtime state for one vhost configuration. The context
    /// stays in the uninitialized set until `child_init` claims it; if
    /// this factory is already child-initialized the deferred init runs
    /// immediately.
    pub fn make_server_context(
        &self,
        options: VhostOptions,
    ) -> FactoryResult<Arc<ServerContext>> {
        let context = ServerContext::new(options);
        self.contexts
            .lock()
            .insert(context.host().clone(), Arc::clone(&context));

        if self.state() == ProcessState::ChildInitialized {
            self.child_init_context(&context)?;
        } else {
            self.coordinator.track_uninitialized(Arc::clone(&context))?;
        }
        Ok(context)
    }

    /// Notification that a vhost's configuration is being torn down.
    /// Returns true when this was the factory's last context.
    pub fn context_destroyed(&self, context: &Arc<ServerContext>) -> bool {
        self.coordinator.untrack(context.host());
        self.contexts.lock().remove(context.host());
        self.teardown_context(context);
        self.contexts.lock().is_empty()
    }

    fn teardown_context(&self, context: &Arc<ServerContext>) {
        // Pending async completions observe this and become no-ops
        context.mark_dead();
        let host = context.host();

        for cache in self.caches.release_all_for(host) {
            cache.shutdown(&self.runtime);
        }
        for buffer in self.message_buffers.release_all_for(host) {
            self.destroy_buffer(&buffer);
        }
        if let Some((_, stats)) = self.vhost_stats.remove(host) {
            if stats.is_owner() {
                if let Err(e) = self.runtime.destroy(stats.handle()) {
                    warn!("Failed to destroy vhost statistics segment: {}", e);
                }
            }
        }
    }

    fn destroy_buffer(&self, buffer: &SharedCircularBuffer) {
        if buffer.is_owner() {
            if let Err(e) = self.runtime.destroy(buffer.handle()) {
                warn!("Failed to destroy message buffer segment: {}", e);
            }
        }
    }

    // ---- shared resources -------------------------------------------------

    /// Cache stack for this context's configuration: reused when an
    /// equivalent configuration already built one, constructed bottom-up
    /// otherwise. Fails with `CacheUnavailable` when the backing
    /// shared-memory budget cannot be reserved.
    pub fn get_or_create_cache(
        &self,
        context: &Arc<ServerContext>,
    ) -> FactoryResult<Arc<TieredCache>> {
        let options = context.options().clone();
        let signature = cache_signature(&options);
        let runtime = Arc::clone(&self.runtime);
        let stats = self.global_stats.lock().clone();
        let store = self.remote_store.lock().clone();

        self.caches
            .get_or_try_insert_with(signature, context.host(), move || {
                let cache = match store {
                    Some(store) => {
                        TieredCache::with_remote_store(&runtime, &options, store, stats)
                    }
                    None => TieredCache::new(&runtime, &options, stats),
                }?;
                Ok::<_, FactoryError>(Arc::new(cache))
            })
    }

    /// Fetcher shared by every configuration with matching fetch
    /// settings. Construction failure is fatal only to this context.
    pub fn get_fetcher(
        &self,
        context: &Arc<ServerContext>,
    ) -> FactoryResult<Arc<RateLimitedFetcher>> {
        Ok(self.fetchers.get_fetcher(context.options())?)
    }

    /// Unwrapped transport fetcher for callers bypassing the
    /// rate-limiting decorator.
    pub fn get_plain_fetcher(
        &self,
        context: &Arc<ServerContext>,
    ) -> FactoryResult<Arc<Fetcher>> {
        Ok(self.fetchers.get_plain_fetcher(context.options())?)
    }

    /// Categorized worker pool; thread counts must be finalized, which
    /// `child_init` guarantees.
    pub fn create_pool(
        &self,
        category: WorkerPoolCategory,
        name: &str,
    ) -> FactoryResult<Arc<WorkerPool>> {
        Ok(self.workers.create_pool(category, name)?)
    }

    /// Background worker for low-priority deferred work.
    pub fn slow_worker(&self) -> FactoryResult<Arc<WorkerPool>> {
        Ok(self.workers.slow_worker()?)
    }

    /// Global shared statistics, present after `root_init`/`child_init`.
    pub fn global_statistics(&self) -> Option<Arc<SharedStats>> {
        self.global_stats.lock().clone()
    }

    /// Per-vhost statistics, present when enabled and the context is
    /// child-initialized.
    pub fn vhost_statistics(&self, host: &HostId) -> Option<Arc<SharedStats>> {
        self.vhost_stats.get(host).map(|s| Arc::clone(s.value()))
    }

    /// The factory-global shared message buffer.
    pub fn message_buffer(&self) -> Option<Arc<SharedCircularBuffer>> {
        self.message_buffers.lookup(&message_buffer_signature(
            self.options.hostname_identifier.as_str(),
        ))
    }

    /// Append to the shared message log; drops the message when the
    /// buffer is not up yet.
    pub fn write_message(&self, message: &str) {
        if let Some(buffer) = self.message_buffer() {
            if let Err(e) = buffer.write_message(message) {
                warn!("Failed to write server message: {}", e);
            }
        }
    }

    /// Quiesce asynchronous cache activity ahead of shutdown so teardown
    /// cannot race fresh lookups.
    pub fn stop_cache_activity(&self) {
        for cache in self.caches.resources() {
            cache.stop_activity();
        }
    }

    pub fn cache_count(&self) -> usize {
        self.caches.len()
    }

    pub fn fetcher_count(&self) -> usize {
        self.fetchers.fetcher_count()
    }
}
