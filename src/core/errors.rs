/*!
 * Error Types
 * Top-level error taxonomy with conversions from subsystem errors
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export subsystem errors
pub use crate::cache::types::CacheError;
pub use crate::fetch::types::FetchError;
pub use crate::lifecycle::types::LifecycleError;
pub use crate::shm::types::ShmError;

/// Errors surfaced by factory-level operations.
///
/// Subsystem errors convert into this type at the factory boundary;
/// transient remote failures never reach it (they are recovered locally
/// as cache misses or fetch failures).
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum FactoryError {
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Fetcher construction failed: {0}")]
    FetcherUnavailable(String),

    #[error("Shared memory error: {0}")]
    SharedMemory(String),

    #[error("Lifecycle ordering violation: {0}")]
    Lifecycle(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<ShmError> for FactoryError {
    fn from(err: ShmError) -> Self {
        FactoryError::SharedMemory(err.to_string())
    }
}

impl From<CacheError> for FactoryError {
    fn from(err: CacheError) -> Self {
        FactoryError::CacheUnavailable(err.to_string())
    }
}

impl From<FetchError> for FactoryError {
    fn from(err: FetchError) -> Self {
        FactoryError::FetcherUnavailable(err.to_string())
    }
}

impl From<LifecycleError> for FactoryError {
    fn from(err: LifecycleError) -> Self {
        FactoryError::Lifecycle(err.to_string())
    }
}

impl From<crate::workers::pool::PoolError> for FactoryError {
    fn from(err: crate::workers::pool::PoolError) -> Self {
        FactoryError::Lifecycle(err.to_string())
    }
}

pub type FactoryResult<T> = Result<T, FactoryError>;
