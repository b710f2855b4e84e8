/*!
 * Workers Module
 * Categorized rewrite thread pools and the slow background worker
 */

pub mod manager;
pub mod pool;

pub use manager::{ThreadCounts, WorkerPoolCategory, WorkerPoolManager};
pub use pool::{PoolError, Task, WorkerPool};
