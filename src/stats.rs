/*!
 * Shared Statistics
 * Counter table living in a shared segment, global plus optional per-vhost
 */

use crate::core::types::Size;
use crate::shm::runtime::{SegmentHandle, SharedSegmentRuntime};
use crate::shm::types::ShmError;
use log::warn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const SLOT_SIZE: Size = 8;

/// Counter variables every statistics object carries.
///
/// Root and child processes must register the same set in the same order,
/// since the slot layout is positional.
pub const STAT_VARIABLES: &[&str] = &[
    "cache_hits",
    "cache_misses",
    "cache_inserted_bytes",
    "remote_cache_errors",
    "fetch_failures",
    "fetch_successes",
];

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StatsSnapshot {
    pub name: String,
    pub counters: HashMap<String, u64>,
}

/// Statistics table backed by a shared segment.
///
/// The root process allocates and zeroes it; children attach. Counter
/// updates are read-modify-write under a per-object lock, which is
/// sufficient at factory-level update rates.
pub struct SharedStats {
    handle: SegmentHandle,
    slots: HashMap<String, usize>,
    update_lock: Mutex<()>,
}

impl SharedStats {
    /// Allocate and zero-initialize the statistics segment (root process).
    pub fn create(runtime: &SharedSegmentRuntime, name: &str) -> Result<Self, ShmError> {
        let handle = runtime.create(name, STAT_VARIABLES.len() * SLOT_SIZE)?;
        for slot in 0..STAT_VARIABLES.len() {
            handle.write(slot * SLOT_SIZE, &0u64.to_le_bytes())?;
        }
        Ok(Self::from_handle(handle))
    }

    /// Attach to statistics the root already created (child process).
    pub fn attach(runtime: &SharedSegmentRuntime, name: &str) -> Result<Self, ShmError> {
        let handle = runtime.attach(name)?;
        Ok(Self::from_handle(handle))
    }

    /// Create in the first process to ask, attach everywhere else.
    pub fn open(runtime: &SharedSegmentRuntime, name: &str) -> Result<Self, ShmError> {
        if runtime.exists(name) {
            Self::attach(runtime, name)
        } else {
            Self::create(runtime, name)
        }
    }

    fn from_handle(handle: SegmentHandle) -> Self {
        let slots = STAT_VARIABLES
            .iter()
            .enumerate()
            .map(|(slot, name)| (name.to_string(), slot))
            .collect();
        Self {
            handle,
            slots,
            update_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    #[inline]
    pub fn is_owner(&self) -> bool {
        self.handle.is_owner()
    }

    pub(crate) fn handle(&self) -> &SegmentHandle {
        &self.handle
    }

    /// Add to a counter. Unknown variables are logged and dropped rather
    /// than treated as fatal.
    pub fn add(&self, variable: &str, delta: u64) {
        let Some(&slot) = self.slots.get(variable) else {
            warn!("Unknown statistics variable '{}'", variable);
            return;
        };
        let _guard = self.update_lock.lock();
        let current = self.read_slot(slot);
        if let Err(e) = self
            .handle
            .write(slot * SLOT_SIZE, &(current + delta).to_le_bytes())
        {
            warn!("Failed to update statistics variable '{}': {}", variable, e);
        }
    }

    /// Current value of a counter; unknown variables read as zero.
    pub fn get(&self, variable: &str) -> u64 {
        self.slots
            .get(variable)
            .map(|&slot| self.read_slot(slot))
            .unwrap_or(0)
    }

    fn read_slot(&self, slot: usize) -> u64 {
        match self.handle.read(slot * SLOT_SIZE, SLOT_SIZE) {
            Ok(bytes) => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                u64::from_le_bytes(buf)
            }
            Err(e) => {
                warn!("Failed to read statistics slot {}: {}", slot, e);
                0
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            name: self.handle.name().to_string(),
            counters: self
                .slots
                .iter()
                .map(|(name, &slot)| (name.clone(), self.read_slot(slot)))
                .collect(),
        }
    }
}
