/*!
 * Fetcher Pool
 * Shares fetchers (and their worker threads) by configuration signature
 */

use super::fetcher::{FetchTransport, Fetcher, RateLimitedFetcher};
use super::types::FetchError;
use crate::config::options::VhostOptions;
use crate::config::signature::{fetcher_signature, ConfigurationSignature};
use crate::stats::SharedStats;
use ahash::RandomState;
use dashmap::DashMap;
use log::info;
use parking_lot::Mutex;
use std::sync::Arc;

/// Pool of fetchers keyed by fetcher signature.
///
/// Fetchers are expensive (each costs a thread), so one is allocated per
/// distinct fetch-relevant configuration. The signature folds in every
/// fetch-relevant field, so two configurations that could disagree on
/// timeout, proxy or TLS policy never share an instance.
pub struct FetcherPool {
    transport: Arc<dyn FetchTransport>,
    stats: Mutex<Option<Arc<SharedStats>>>,
    fetchers: DashMap<ConfigurationSignature, Arc<RateLimitedFetcher>, RandomState>,
    plain_fetchers: DashMap<ConfigurationSignature, Arc<Fetcher>, RandomState>,
}

impl FetcherPool {
    pub fn new(transport: Arc<dyn FetchTransport>) -> Self {
        Self {
            transport,
            stats: Mutex::new(None),
            fetchers: DashMap::with_hasher(RandomState::new()),
            plain_fetchers: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Wire shared statistics into fetchers created from now on.
    pub fn set_stats(&self, stats: Arc<SharedStats>) {
        *self.stats.lock() = Some(stats);
    }

    /// Fetcher for this configuration, shared with existing ones when the
    /// signature matches, otherwise newly created along with its worker
    /// thread. Construction failure leaves sibling configurations intact.
    pub fn get_fetcher(
        &self,
        options: &VhostOptions,
    ) -> Result<Arc<RateLimitedFetcher>, FetchError> {
        let signature = fetcher_signature(options);
        if let Some(existing) = self.fetchers.get(&signature) {
            return Ok(Arc::clone(existing.value()));
        }

        let plain = self.get_plain_fetcher(options)?;
        let fetcher = Arc::new(RateLimitedFetcher::new(plain));
        info!("Pooled new fetcher for signature '{}'", signature);

        // A racing thread may have registered one meanwhile; keep the
        // first registration so identity stays unique per signature.
        let entry = self
            .fetchers
            .entry(signature)
            .or_insert_with(|| Arc::clone(&fetcher));
        Ok(Arc::clone(entry.value()))
    }

    /// Unwrapped transport fetcher, bypassing the rate-limiting
    /// decorator, for callers that explicitly need it.
    pub fn get_plain_fetcher(&self, options: &VhostOptions) -> Result<Arc<Fetcher>, FetchError> {
        let signature = fetcher_signature(options);
        if let Some(existing) = self.plain_fetchers.get(&signature) {
            return Ok(Arc::clone(existing.value()));
        }

        let stats = self.stats.lock().clone();
        let fetcher = Arc::new(Fetcher::spawn(
            options.fetch.clone(),
            Arc::clone(&self.transport),
            stats,
        )?);

        let entry = self
            .plain_fetchers
            .entry(signature)
            .or_insert_with(|| Arc::clone(&fetcher));
        Ok(Arc::clone(entry.value()))
    }

    pub fn fetcher_count(&self) -> usize {
        self.plain_fetchers.len()
    }

    /// Shut down every pooled fetcher and its worker thread.
    pub fn shutdown_all(&self) {
        for entry in self.fetchers.iter() {
            entry.value().shutdown();
        }
        for entry in self.plain_fetchers.iter() {
            entry.value().shutdown();
        }
        self.fetchers.clear();
        self.plain_fetchers.clear();
        info!("Fetcher pool shut down");
    }
}
