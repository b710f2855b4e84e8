/*!
 * Shared Memory Types
 * Constants and errors for the shared segment runtime
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Segment limits
pub const MAX_SEGMENT_SIZE: usize = 100 * 1024 * 1024; // 100MB per segment

/// Shared segment error types
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum ShmError {
    /// Segment already created; creation is a root-only, one-time event
    #[error("Segment already exists: {0}")]
    SegmentExists(String),

    /// Attach attempted before the root created the segment
    #[error("Segment not found: {0}")]
    SegmentNotFound(String),

    /// Invalid size
    #[error("Invalid size: {0}")]
    InvalidSize(String),

    /// Segment size exceeds maximum allowed
    #[error("Segment size exceeds limit: requested {requested}, max {max}")]
    SizeExceeded { requested: usize, max: usize },

    /// Invalid offset or size range
    #[error("Invalid offset or size: offset {offset}, size {size}, segment size {segment_size}")]
    InvalidRange {
        offset: usize,
        size: usize,
        segment_size: usize,
    },

    /// Segment allocation failed
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    /// Destruction attempted through a non-owning attachment
    #[error("Not segment owner: {0}")]
    NotOwner(String),
}
