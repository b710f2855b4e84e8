/*!
 * Cache Module
 * Composable cache tiers: shm L1, remote L2, batching, async, stats
 */

pub mod async_cache;
pub mod batcher;
pub mod remote;
pub mod shm_cache;
pub mod stats;
pub mod tiered;
pub mod traits;
pub mod types;

pub use async_cache::AsyncCache;
pub use batcher::BatchingCache;
pub use remote::{InProcessStore, RemoteCache};
pub use shm_cache::ShmCache;
pub use stats::StatsCache;
pub use tiered::TieredCache;
pub use traits::{CacheBackend, LookupCallback, RemoteStore, Value};
pub use types::{CacheCounters, CacheCountersSnapshot, CacheError};
