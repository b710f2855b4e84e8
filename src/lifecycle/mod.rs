/*!
 * Lifecycle Module
 * Explicit state machine for the root/child shared-memory handoff
 */

pub mod coordinator;
pub mod types;

pub use coordinator::ProcessLifecycleCoordinator;
pub use types::{LifecycleError, ProcessState};
