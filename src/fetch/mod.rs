/*!
 * Fetch Module
 * Pooled origin fetchers with dedicated I/O worker threads
 */

pub mod fetcher;
pub mod pool;
pub mod types;

pub use fetcher::{FetchTransport, Fetcher, RateLimitedFetcher};
pub use pool::FetcherPool;
pub use types::{FetchCallback, FetchError, FetchRequest, FetchResponse};
