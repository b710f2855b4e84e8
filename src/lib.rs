/*!
 * vhost-factory Library
 * Multi-tier caching and shared-resource coordination for a
 * request-processing server extension
 */

pub mod cache;
pub mod config;
pub mod context;
pub mod core;
pub mod factory;
pub mod fetch;
pub mod lifecycle;
pub mod registry;
pub mod shm;
pub mod stats;
pub mod workers;

// Re-exports
pub use crate::core::{FactoryError, FactoryResult, HostId};
pub use cache::{CacheBackend, RemoteStore, TieredCache};
pub use config::{ConfigurationSignature, FactoryOptions, TlsPolicy, VhostOptions};
pub use context::ServerContext;
pub use factory::ResourceFactory;
pub use fetch::{FetchRequest, FetchResponse, FetchTransport, Fetcher, RateLimitedFetcher};
pub use lifecycle::ProcessState;
pub use shm::{SharedCircularBuffer, SharedSegmentRuntime};
pub use stats::SharedStats;
pub use workers::{WorkerPool, WorkerPoolCategory, WorkerPoolManager};
