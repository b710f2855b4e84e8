/*!
 * Shared-Memory Cache Tier
 * Fixed-byte-budget L1 over a shared segment, LRU eviction
 */

use super::traits::{CacheBackend, Value};
use super::types::CacheError;
use crate::core::types::Size;
use crate::shm::runtime::{SegmentHandle, SharedSegmentRuntime};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;

struct Entry {
    offset: Size,
    len: Size,
    last_use: u64,
}

struct ShmCacheState {
    entries: HashMap<String, Entry>,
    used_bytes: Size,
    // Bump pointer into the segment; freed space behind it is reclaimed
    // by compaction when a write would run past the end
    write_pos: Size,
    tick: u64,
}

/// L1 cache tier sized by a fixed byte budget.
///
/// The budget is reserved in shared memory once per distinct cache
/// configuration, never per request, and entry bytes are stored through
/// the segment handle. The key index is per-attachment, like the slot
/// map of the shared statistics table. Values that do not fit the budget
/// at all are rejected; the tiered composition routes those to the
/// remote tier instead.
pub struct ShmCache {
    handle: SegmentHandle,
    budget: Size,
    state: Mutex<ShmCacheState>,
}

impl ShmCache {
    /// Reserve the segment and build the tier. The segment is created by
    /// the first process to construct this cache configuration; later
    /// processes attach to the existing reservation.
    pub fn new(
        runtime: &SharedSegmentRuntime,
        segment_name: &str,
        budget: Size,
    ) -> Result<Self, CacheError> {
        let handle = runtime.create_or_attach(segment_name, budget)?;
        debug!(
            "Shared-memory cache tier over '{}' ({} byte budget)",
            segment_name, budget
        );
        Ok(Self {
            handle,
            budget,
            state: Mutex::new(ShmCacheState {
                entries: HashMap::new(),
                used_bytes: 0,
                write_pos: 0,
                tick: 0,
            }),
        })
    }

    #[inline]
    pub fn budget(&self) -> Size {
        self.budget
    }

    pub(crate) fn handle(&self) -> &SegmentHandle {
        &self.handle
    }

    pub fn used_bytes(&self) -> Size {
        self.state.lock().used_bytes
    }

    fn evict_until_fits(state: &mut ShmCacheState, budget: Size, incoming: Size) {
        while state.used_bytes + incoming > budget && !state.entries.is_empty() {
            let victim = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_use)
                .map(|(key, _)| key.clone());
            if let Some(key) = victim {
                if let Some(entry) = state.entries.remove(&key) {
                    state.used_bytes -= entry.len;
                }
            }
        }
    }

    /// Rewrite live entries contiguously from the segment start, freeing
    /// the holes left by evicted and deleted entries. Live bytes total at
    /// most the budget, so everything fits after the move.
    fn compact(handle: &SegmentHandle, state: &mut ShmCacheState) {
        let mut placements: Vec<(String, Size, Size)> = state
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.offset, entry.len))
            .collect();
        placements.sort_by_key(|&(_, offset, _)| offset);

        let mut pos = 0;
        for (key, offset, len) in placements {
            if offset != pos {
                let moved = handle
                    .read(offset, len)
                    .and_then(|bytes| handle.write(pos, &bytes));
                if let Err(e) = moved {
                    warn!("Failed to compact cache entry '{}': {}", key, e);
                    if state.entries.remove(&key).is_some() {
                        state.used_bytes -= len;
                    }
                    continue;
                }
                if let Some(entry) = state.entries.get_mut(&key) {
                    entry.offset = pos;
                }
            }
            pos += len;
        }
        state.write_pos = pos;
        debug!("Compacted cache segment '{}' to {} bytes", handle.name(), pos);
    }
}

impl CacheBackend for ShmCache {
    fn name(&self) -> &'static str {
        "shm"
    }

    fn get(&self, key: &str) -> Option<Value> {
        let (offset, len) = {
            let mut state = self.state.lock();
            state.tick += 1;
            let tick = state.tick;
            let entry = state.entries.get_mut(key)?;
            entry.last_use = tick;
            (entry.offset, entry.len)
        };
        match self.handle.read(offset, len) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Failed to read cache entry '{}': {}", key, e);
                None
            }
        }
    }

    fn put(&self, key: &str, value: Value) {
        if value.len() > self.budget {
            debug!(
                "Value for '{}' ({} bytes) exceeds shm budget, dropped",
                key,
                value.len()
            );
            return;
        }
        let mut state = self.state.lock();
        if let Some(old) = state.entries.remove(key) {
            state.used_bytes -= old.len;
        }
        Self::evict_until_fits(&mut state, self.budget, value.len());
        if state.write_pos + value.len() > self.budget {
            Self::compact(&self.handle, &mut state);
        }
        let offset = state.write_pos;
        if let Err(e) = self.handle.write(offset, &value) {
            warn!("Failed to store cache entry '{}': {}", key, e);
            return;
        }
        state.write_pos += value.len();
        state.used_bytes += value.len();
        state.tick += 1;
        let tick = state.tick;
        state.entries.insert(
            key.to_string(),
            Entry {
                offset,
                len: value.len(),
                last_use: tick,
            },
        );
    }

    fn delete(&self, key: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.remove(key) {
            state.used_bytes -= entry.len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(budget: Size) -> (SharedSegmentRuntime, ShmCache) {
        let runtime = SharedSegmentRuntime::new();
        let cache = ShmCache::new(&runtime, "cache/test", budget).unwrap();
        (runtime, cache)
    }

    #[test]
    fn get_put_round_trip() {
        let (_rt, cache) = cache(1024);
        cache.put("k", b"value".to_vec());
        assert_eq!(cache.get("k"), Some(b"value".to_vec()));
        cache.delete("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn values_live_in_the_shared_segment() {
        let runtime = SharedSegmentRuntime::new();
        let cache = ShmCache::new(&runtime, "cache/test", 64).unwrap();
        // First entry lands at the segment start
        cache.put("k", b"shared".to_vec());

        let peer = runtime.attach("cache/test").unwrap();
        assert_eq!(peer.read(0, 6).unwrap(), b"shared");
    }

    #[test]
    fn eviction_respects_budget() {
        let (_rt, cache) = cache(10);
        cache.put("a", vec![0u8; 6]);
        cache.put("b", vec![0u8; 6]);
        // "a" was least recently used and must go
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(vec![0u8; 6]));
        assert!(cache.used_bytes() <= 10);
    }

    #[test]
    fn recently_used_survives_eviction() {
        let (_rt, cache) = cache(12);
        cache.put("a", vec![1u8; 5]);
        cache.put("b", vec![2u8; 5]);
        cache.get("a");
        cache.put("c", vec![3u8; 5]);
        assert!(cache.get("a").is_some());
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn compaction_reclaims_freed_space() {
        let (_rt, cache) = cache(10);
        cache.put("a", vec![1u8; 4]);
        cache.put("b", vec![2u8; 4]);
        cache.delete("a");
        // Fits the budget only after the hole "a" left is reclaimed
        cache.put("c", vec![3u8; 4]);
        assert_eq!(cache.get("b"), Some(vec![2u8; 4]));
        assert_eq!(cache.get("c"), Some(vec![3u8; 4]));
        assert!(cache.used_bytes() <= 10);
    }

    #[test]
    fn oversized_value_rejected() {
        let (_rt, cache) = cache(8);
        cache.put("big", vec![0u8; 64]);
        assert_eq!(cache.get("big"), None);
        assert_eq!(cache.used_bytes(), 0);
    }

    #[test]
    fn random_churn_never_exceeds_budget() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let budget = 512;
        let (_rt, cache) = cache(budget);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let key = format!("k{}", rng.gen_range(0..64));
            let len = rng.gen_range(1..=96);
            cache.put(&key, vec![0u8; len]);
            assert!(cache.used_bytes() <= budget);
        }
    }

    #[test]
    fn budget_over_segment_limit_fails_construction() {
        let runtime = SharedSegmentRuntime::new();
        let result = ShmCache::new(&runtime, "cache/huge", usize::MAX / 2);
        assert!(matches!(result, Err(CacheError::BackingStore(_))));
    }
}
