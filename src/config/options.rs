/*!
 * Configuration Options
 * Per-vhost and factory-wide option structs filled in by the directive layer
 */

use crate::core::types::{HostId, Size};
use serde::{Deserialize, Serialize};

/// Default L1 cache byte budget (8 MB)
pub const DEFAULT_CACHE_BYTE_BUDGET: Size = 8 * 1024 * 1024;

/// Values larger than this bypass the shared-memory tier (1 MB)
pub const DEFAULT_LARGE_VALUE_THRESHOLD: Size = 1024 * 1024;

/// Default shared message buffer size (64 KB)
pub const DEFAULT_MESSAGE_BUFFER_SIZE: Size = 64 * 1024;

/// Default origin fetch timeout in milliseconds
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5_000;

/// Default cap on concurrently outstanding fetches per fetcher
pub const DEFAULT_MAX_INFLIGHT_FETCHES: usize = 128;

/// TLS policy applied to origin fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Plain HTTP only
    Disabled,
    /// HTTPS allowed, certificate errors tolerated
    Permissive,
    /// HTTPS with full certificate verification
    Strict,
}

/// Fetch-relevant settings.
///
/// Every field here participates in the fetcher signature, so two
/// configurations differing in any of them never share a fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    pub timeout_ms: u64,
    pub proxy: Option<String>,
    pub tls_policy: TlsPolicy,
    pub max_inflight: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            proxy: None,
            tls_policy: TlsPolicy::Strict,
            max_inflight: DEFAULT_MAX_INFLIGHT_FETCHES,
        }
    }
}

/// Configuration for one virtual host, produced by the directive-parsing
/// layer before the host's server context is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VhostOptions {
    pub host: HostId,
    /// Filesystem path the cache is rooted at; part of the cache identity
    pub cache_path: String,
    /// Byte budget for the shared-memory tier
    pub cache_byte_budget: Size,
    /// Values above this size route to the remote tier only
    pub large_value_threshold: Size,
    /// Remote cache endpoints ("host:port"); empty disables the remote tier
    pub remote_servers: Vec<String>,
    pub fetch: FetchOptions,
}

impl VhostOptions {
    pub fn new(host: HostId, cache_path: impl Into<String>) -> Self {
        Self {
            host,
            cache_path: cache_path.into(),
            cache_byte_budget: DEFAULT_CACHE_BYTE_BUDGET,
            large_value_threshold: DEFAULT_LARGE_VALUE_THRESHOLD,
            remote_servers: Vec::new(),
            fetch: FetchOptions::default(),
        }
    }

    #[must_use]
    pub fn with_byte_budget(mut self, budget: Size) -> Self {
        self.cache_byte_budget = budget;
        self
    }

    #[must_use]
    pub fn with_large_value_threshold(mut self, threshold: Size) -> Self {
        self.large_value_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_remote_servers(mut self, servers: Vec<String>) -> Self {
        self.remote_servers = servers;
        self
    }

    #[must_use]
    pub fn with_fetch_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.fetch.timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.fetch.proxy = Some(proxy.into());
        self
    }

    #[must_use]
    pub fn with_tls_policy(mut self, policy: TlsPolicy) -> Self {
        self.fetch.tls_policy = policy;
        self
    }

    /// True when a remote tier should be constructed
    #[inline]
    pub fn has_remote_cache(&self) -> bool {
        !self.remote_servers.is_empty()
    }
}

/// Factory-wide options, set once from the main server block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryOptions {
    /// Identifier of the server this factory belongs to; shared segment
    /// names derive from it
    pub hostname_identifier: HostId,
    /// Size of the shared circular message buffer
    pub message_buffer_size: Size,
    /// Separate statistics object per vhost in addition to the global
    /// aggregate
    pub use_per_vhost_statistics: bool,
    /// Explicit thread count for general rewrite work; auto-detected when
    /// absent
    pub num_rewrite_threads: Option<usize>,
    /// Explicit thread count for expensive rewrite work; auto-detected
    /// when absent
    pub num_expensive_rewrite_threads: Option<usize>,
}

impl FactoryOptions {
    pub fn new(hostname_identifier: HostId) -> Self {
        Self {
            hostname_identifier,
            message_buffer_size: DEFAULT_MESSAGE_BUFFER_SIZE,
            use_per_vhost_statistics: false,
            num_rewrite_threads: None,
            num_expensive_rewrite_threads: None,
        }
    }

    #[must_use]
    pub fn with_message_buffer_size(mut self, size: Size) -> Self {
        self.message_buffer_size = size;
        self
    }

    #[must_use]
    pub fn with_per_vhost_statistics(mut self) -> Self {
        self.use_per_vhost_statistics = true;
        self
    }

    #[must_use]
    pub fn with_rewrite_threads(mut self, count: usize) -> Self {
        self.num_rewrite_threads = Some(count);
        self
    }

    #[must_use]
    pub fn with_expensive_rewrite_threads(mut self, count: usize) -> Self {
        self.num_expensive_rewrite_threads = Some(count);
        self
    }
}
