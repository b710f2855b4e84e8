/*!
 * Lifecycle Types
 * Process states and lifecycle ordering errors
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle errors: ordering violations are programming errors, not
/// runtime conditions, and are asserted in debug builds.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum LifecycleError {
    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: ProcessState, to: ProcessState },

    #[error("Factory already shut down")]
    AlreadyShutDown,

    #[error("Context for '{0}' already registered")]
    ContextExists(String),
}

/// Per-factory process state.
///
/// The root/child shared-memory handoff is an explicit state machine
/// rather than call-order convention. `RootInitialized ->
/// ChildInitialized` is a legal transition: with fork involved one
/// process may effectively see both init calls, and child status
/// overrides root status, never the other way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Unstarted,
    RootInitialized,
    ChildInitialized,
    ShutDown,
}

impl ProcessState {
    /// Whether `self -> to` is a legal transition.
    pub fn can_transition(self, to: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, to),
            (Unstarted, RootInitialized)
                | (Unstarted, ChildInitialized)
                | (RootInitialized, ChildInitialized)
                | (Unstarted, ShutDown)
                | (RootInitialized, ShutDown)
                | (ChildInitialized, ShutDown)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Unstarted => "unstarted",
            ProcessState::RootInitialized => "root_initialized",
            ProcessState::ChildInitialized => "child_initialized",
            ProcessState::ShutDown => "shut_down",
        };
        f.write_str(name)
    }
}
