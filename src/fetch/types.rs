/*!
 * Fetch Types
 * Requests, responses and errors for origin fetching
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fetch error types
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum FetchError {
    /// Origin did not answer within the configured timeout
    #[error("Fetch timed out after {0} ms")]
    Timeout(u64),

    /// Transport-level failure; recovered by the caller, never retried
    /// by this layer
    #[error("Transport error: {0}")]
    Transport(String),

    /// Too many outstanding fetches on this fetcher
    #[error("Fetch rate limited: {inflight}/{max} outstanding")]
    RateLimited { inflight: usize, max: usize },

    /// Fetcher worker thread could not be created
    #[error("Failed to start fetcher worker: {0}")]
    SpawnFailed(String),

    /// Fetcher already shut down
    #[error("Fetcher shut down")]
    ShutDown,
}

/// One origin fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Origin response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Completion callback for asynchronous fetches
pub type FetchCallback = Box<dyn FnOnce(Result<FetchResponse, FetchError>) + Send + 'static>;
