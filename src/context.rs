/*!
 * Server Context
 * Per-vhost runtime state with explicit liveness for late callbacks
 */

use crate::config::options::VhostOptions;
use crate::core::types::HostId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Runtime state of one virtual host configuration.
///
/// Created when the host's configuration is finalized and tracked by the
/// factory as uninitialized until `child_init` claims it. Pending
/// asynchronous cache lookups hold the liveness flag and become no-ops
/// once the context is torn down, instead of touching freed state.
pub struct ServerContext {
    host: HostId,
    options: VhostOptions,
    live: Arc<AtomicBool>,
    child_initialized: AtomicBool,
}

impl ServerContext {
    pub fn new(options: VhostOptions) -> Arc<Self> {
        Arc::new(Self {
            host: options.host.clone(),
            options,
            live: Arc::new(AtomicBool::new(true)),
            child_initialized: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn host(&self) -> &HostId {
        &self.host
    }

    #[inline]
    pub fn options(&self) -> &VhostOptions {
        &self.options
    }

    /// Shared liveness flag, cloned into async completions.
    #[inline]
    pub fn liveness(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.live)
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn mark_child_initialized(&self) {
        self.child_initialized.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_child_initialized(&self) -> bool {
        self.child_initialized.load(Ordering::Acquire)
    }

    /// Clear liveness; pending callbacks observing this drop themselves.
    pub(crate) fn mark_dead(&self) {
        self.live.store(false, Ordering::Release);
    }
}
