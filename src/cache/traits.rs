/*!
 * Cache Trait Seams
 * Backend interface shared by every tier and the remote store boundary
 */

use super::types::CacheError;

/// Cached value bytes
pub type Value = Vec<u8>;

/// Completion callback for asynchronous lookups
pub type LookupCallback = Box<dyn FnOnce(Option<Value>) + Send + 'static>;

/// One tier in a composed cache.
///
/// Implementations are internally thread-safe; handles returned to
/// callers are shared across request threads without external locking.
pub trait CacheBackend: Send + Sync {
    /// Short tier name for logs and stats
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> Option<Value>;

    fn put(&self, key: &str, value: Value);

    fn delete(&self, key: &str);

    /// False once the tier has seen unrecoverable backend failures
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Transport boundary of the remote tier.
///
/// The actual wire protocol lives outside this crate; the remote tier
/// programs against this seam and recovers every error as a miss.
pub trait RemoteStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;
}
