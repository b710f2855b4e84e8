/*!
 * Shared Memory Module
 * Named segment runtime shared by caches, statistics and the message log
 */

pub mod circular;
pub mod runtime;
pub mod types;

pub use circular::SharedCircularBuffer;
pub use runtime::{SegmentHandle, SharedSegmentRuntime};
pub use types::ShmError;
