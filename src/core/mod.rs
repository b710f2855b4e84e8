/*!
 * Core Module
 * Shared types and the factory error taxonomy
 */

pub mod errors;
pub mod types;

pub use errors::{FactoryError, FactoryResult};
pub use types::{HostId, Size};
