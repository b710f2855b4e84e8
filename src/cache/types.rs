/*!
 * Cache Types
 * Errors and counters shared by all cache tiers
 */

use crate::shm::types::ShmError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Cache construction and operation errors.
///
/// Per-request remote failures never surface as errors; they degrade to
/// misses. These variants cover construction-time problems only.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum CacheError {
    /// Backing shared-memory allocation could not be obtained
    #[error("Backing store unavailable: {0}")]
    BackingStore(String),

    /// Remote endpoint list could not be parsed
    #[error("Invalid remote endpoint: {0}")]
    InvalidEndpoint(String),

    /// Remote store operation failed; recovered as a miss by callers
    #[error("Remote cache error: {0}")]
    Remote(String),
}

impl From<ShmError> for CacheError {
    fn from(err: ShmError) -> Self {
        CacheError::BackingStore(err.to_string())
    }
}

/// Hit/miss/byte counters for one logical cache.
///
/// Updated by the statistics decorator; cheap enough to share across all
/// request threads.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserted_bytes: AtomicU64,
    remote_errors: AtomicU64,
}

impl CacheCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_insert(&self, bytes: usize) {
        self.inserted_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_remote_error(&self) {
        self.remote_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheCountersSnapshot {
        CacheCountersSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserted_bytes: self.inserted_bytes.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of [`CacheCounters`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CacheCountersSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserted_bytes: u64,
    pub remote_errors: u64,
}
