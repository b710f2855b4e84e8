/*!
 * Process Lifecycle Coordinator
 * Root/child shared-memory handoff and uninitialized-context tracking
 */

use super::types::{LifecycleError, ProcessState};
use crate::context::ServerContext;
use crate::core::types::HostId;
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Tracks which lifecycle state this factory's process is in and which
/// per-host contexts still await child initialization.
///
/// Contexts enter the uninitialized set at creation. `child_init` drains
/// the set as it performs each context's deferred initialization; in the
/// root process no `child_init` ever arrives, so whatever remains at
/// shutdown is destroyed directly.
pub struct ProcessLifecycleCoordinator {
    state: Mutex<ProcessState>,
    uninitialized: Mutex<HashMap<HostId, Arc<ServerContext>>>,
}

impl ProcessLifecycleCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProcessState::Unstarted),
            uninitialized: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    /// True while this process has only root-initialized; the root never
    /// serves traffic.
    pub fn is_root_process(&self) -> bool {
        self.state() == ProcessState::RootInitialized
    }

    pub fn transition(&self, to: ProcessState) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        if !state.can_transition(to) {
            debug_assert!(
                false,
                "invalid lifecycle transition {} -> {}",
                *state, to
            );
            return Err(LifecycleError::InvalidTransition { from: *state, to });
        }
        info!("Lifecycle transition: {} -> {}", *state, to);
        *state = to;
        Ok(())
    }

    /// Track a freshly created context until child init claims it.
    pub fn track_uninitialized(
        &self,
        context: Arc<ServerContext>,
    ) -> Result<(), LifecycleError> {
        let mut uninitialized = self.uninitialized.lock();
        let host = context.host().clone();
        if uninitialized.contains_key(&host) {
            return Err(LifecycleError::ContextExists(host.to_string()));
        }
        uninitialized.insert(host, context);
        Ok(())
    }

    /// Remove and return every context awaiting initialization.
    pub fn take_uninitialized(&self) -> Vec<Arc<ServerContext>> {
        let mut uninitialized = self.uninitialized.lock();
        let contexts: Vec<_> = uninitialized.drain().map(|(_, ctx)| ctx).collect();
        if !contexts.is_empty() {
            info!("Claimed {} uninitialized contexts", contexts.len());
        }
        contexts
    }

    /// Remove one context from tracking, e.g. when its vhost is torn
    /// down before any child process started.
    pub fn untrack(&self, host: &HostId) -> Option<Arc<ServerContext>> {
        let removed = self.uninitialized.lock().remove(host);
        if removed.is_some() {
            warn!("Context '{}' destroyed before child init", host);
        }
        removed
    }

    pub fn uninitialized_count(&self) -> usize {
        self.uninitialized.lock().len()
    }
}

impl Default for ProcessLifecycleCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::options::VhostOptions;

    fn context(host: &str) -> Arc<ServerContext> {
        ServerContext::new(VhostOptions::new(
            HostId::from_identifier(host),
            "/var/cache/ps",
        ))
    }

    #[test]
    fn root_then_child_ends_child_initialized() {
        let coordinator = ProcessLifecycleCoordinator::new();
        coordinator.transition(ProcessState::RootInitialized).unwrap();
        assert!(coordinator.is_root_process());
        coordinator.transition(ProcessState::ChildInitialized).unwrap();
        assert_eq!(coordinator.state(), ProcessState::ChildInitialized);
        assert!(!coordinator.is_root_process());
    }

    #[test]
    fn duplicate_context_rejected() {
        let coordinator = ProcessLifecycleCoordinator::new();
        coordinator.track_uninitialized(context("a:80")).unwrap();
        let err = coordinator.track_uninitialized(context("a:80")).unwrap_err();
        assert!(matches!(err, LifecycleError::ContextExists(_)));
    }

    #[test]
    fn take_drains_the_set() {
        let coordinator = ProcessLifecycleCoordinator::new();
        coordinator.track_uninitialized(context("a:80")).unwrap();
        coordinator.track_uninitialized(context("b:80")).unwrap();
        assert_eq!(coordinator.take_uninitialized().len(), 2);
        assert_eq!(coordinator.uninitialized_count(), 0);
    }
}
