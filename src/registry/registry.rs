/*!
 * Resource Registry
 * At-most-one live resource per configuration signature
 */

use crate::config::signature::ConfigurationSignature;
use crate::core::types::HostId;
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info};
use std::collections::HashSet;
use std::sync::Arc;

struct RegistryEntry<R> {
    resource: Arc<R>,
    referrers: HashSet<HostId>,
}

/// Signature-keyed registry of shared resources.
///
/// Guarantees at most one live resource per signature; `release` reports
/// when the released context was the last referrer, which is the
/// caller's signal to actually free the underlying OS resource. Lookups
/// and inserts are infrequent relative to request traffic, so per-shard
/// locking in the map is plenty.
pub struct ResourceRegistry<R> {
    name: &'static str,
    entries: DashMap<ConfigurationSignature, RegistryEntry<R>, RandomState>,
}

impl<R> ResourceRegistry<R> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Register a resource for `signature` with `host` as its first
    /// referrer. Existing registrations win: the already-live resource
    /// is returned and the offered one is dropped, preserving identity
    /// per signature under races.
    pub fn register(
        &self,
        signature: ConfigurationSignature,
        host: &HostId,
        resource: Arc<R>,
    ) -> Arc<R> {
        let mut entry = self
            .entries
            .entry(signature)
            .or_insert_with(|| RegistryEntry {
                resource,
                referrers: HashSet::new(),
            });
        entry.referrers.insert(host.clone());
        Arc::clone(&entry.resource)
    }

    /// Resource registered for `signature`, if any, without touching the
    /// referrer set.
    pub fn lookup(&self, signature: &ConfigurationSignature) -> Option<Arc<R>> {
        self.entries
            .get(signature)
            .map(|entry| Arc::clone(&entry.resource))
    }

    /// Look up and add `host` as a referrer in one step.
    pub fn acquire(
        &self,
        signature: &ConfigurationSignature,
        host: &HostId,
    ) -> Option<Arc<R>> {
        let mut entry = self.entries.get_mut(signature)?;
        entry.referrers.insert(host.clone());
        Some(Arc::clone(&entry.resource))
    }

    /// Reuse the resource for `signature` or build it with `build`.
    /// Construction happens at most once per live signature except under
    /// construction races, where the losing instance is dropped unused.
    pub fn get_or_try_insert_with<E, F>(
        &self,
        signature: ConfigurationSignature,
        host: &HostId,
        build: F,
    ) -> Result<Arc<R>, E>
    where
        F: FnOnce() -> Result<Arc<R>, E>,
    {
        if let Some(existing) = self.acquire(&signature, host) {
            debug!("{} registry hit for '{}'", self.name, signature);
            return Ok(existing);
        }
        let resource = build()?;
        info!("{} registry created resource for '{}'", self.name, signature);
        Ok(self.register(signature, host, resource))
    }

    /// Drop `host`'s reference to `signature`. Returns the resource
    /// exactly when this was the last referrer; the entry is gone
    /// afterwards, so a second release for the same signature cannot
    /// free anything twice.
    pub fn release(
        &self,
        signature: &ConfigurationSignature,
        host: &HostId,
    ) -> Option<Arc<R>> {
        let last = {
            let mut entry = self.entries.get_mut(signature)?;
            entry.referrers.remove(host);
            entry.referrers.is_empty()
        };
        if !last {
            return None;
        }
        self.entries.remove(signature).map(|(signature, entry)| {
            info!(
                "{} registry released last reference for '{}'",
                self.name, signature
            );
            entry.resource
        })
    }

    /// Drop every reference `host` holds, returning the resources whose
    /// last reference this was.
    pub fn release_all_for(&self, host: &HostId) -> Vec<Arc<R>> {
        let signatures: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| entry.value().referrers.contains(host))
            .map(|entry| entry.key().clone())
            .collect();
        signatures
            .iter()
            .filter_map(|signature| self.release(signature, host))
            .collect()
    }

    /// Every live resource, for registry-wide operations like quiescing.
    pub fn resources(&self) -> Vec<Arc<R>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.value().resource))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove everything, returning the resources for final teardown.
    pub fn drain(&self) -> Vec<Arc<R>> {
        let signatures: Vec<_> = self.entries.iter().map(|e| e.key().clone()).collect();
        signatures
            .iter()
            .filter_map(|signature| self.entries.remove(signature))
            .map(|(_, entry)| entry.resource)
            .collect()
    }
}
