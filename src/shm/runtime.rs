/*!
 * Shared Segment Runtime
 * Creation and attachment of named shared-memory segments
 */

use super::types::{ShmError, MAX_SEGMENT_SIZE};
use crate::core::types::Size;
use ahash::RandomState;
use dashmap::DashMap;
use log::{info, warn};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One named shared-memory region.
///
/// The runtime owns the backing storage; handles share it. A block is
/// never resized after creation.
pub struct SegmentBlock {
    name: String,
    size: Size,
    data: RwLock<Vec<u8>>,
    attach_count: AtomicUsize,
}

impl SegmentBlock {
    fn new(name: String, size: Size) -> Self {
        Self {
            name,
            size,
            data: RwLock::new(vec![0u8; size]),
            attach_count: AtomicUsize::new(0),
        }
    }
}

/// Handle to a shared segment.
///
/// The creating process holds the owning handle and is the only one
/// allowed to destroy the segment; attachments are non-owning.
pub struct SegmentHandle {
    block: Arc<SegmentBlock>,
    owned: bool,
}

impl SegmentHandle {
    #[inline]
    pub fn name(&self) -> &str {
        &self.block.name
    }

    #[inline]
    pub fn size(&self) -> Size {
        self.block.size
    }

    #[inline]
    pub fn is_owner(&self) -> bool {
        self.owned
    }

    pub fn read(&self, offset: Size, size: Size) -> Result<Vec<u8>, ShmError> {
        if offset + size > self.block.size {
            return Err(ShmError::InvalidRange {
                offset,
                size,
                segment_size: self.block.size,
            });
        }
        let data = self.block.data.read();
        Ok(data[offset..offset + size].to_vec())
    }

    pub fn write(&self, offset: Size, bytes: &[u8]) -> Result<(), ShmError> {
        if offset + bytes.len() > self.block.size {
            return Err(ShmError::InvalidRange {
                offset,
                size: bytes.len(),
                segment_size: self.block.size,
            });
        }
        let mut data = self.block.data.write();
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// Runtime over the process-shared segment namespace.
///
/// The root process creates segments exactly once per server start;
/// every subsequent call for the same name, from any process, is a pure
/// attach with no allocation. All factory instances of one server share
/// one runtime.
pub struct SharedSegmentRuntime {
    segments: DashMap<String, Arc<SegmentBlock>, RandomState>,
}

impl SharedSegmentRuntime {
    pub fn new() -> Self {
        Self {
            segments: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Create a named segment. Fails if it already exists; creation is
    /// the root process's job and happens once per server start.
    pub fn create(&self, name: &str, size: Size) -> Result<SegmentHandle, ShmError> {
        if size == 0 {
            return Err(ShmError::InvalidSize("Size cannot be zero".to_string()));
        }
        if size > MAX_SEGMENT_SIZE {
            return Err(ShmError::SizeExceeded {
                requested: size,
                max: MAX_SEGMENT_SIZE,
            });
        }
        if self.segments.contains_key(name) {
            return Err(ShmError::SegmentExists(name.to_string()));
        }

        let block = Arc::new(SegmentBlock::new(name.to_string(), size));
        self.segments.insert(name.to_string(), Arc::clone(&block));

        info!("Created shared segment '{}' ({} bytes)", name, size);

        Ok(SegmentHandle { block, owned: true })
    }

    /// Attach to an existing segment. Never allocates.
    pub fn attach(&self, name: &str) -> Result<SegmentHandle, ShmError> {
        let block = self
            .segments
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ShmError::SegmentNotFound(name.to_string()))?;

        let attaches = block.attach_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Attached to shared segment '{}' ({} attachments)", name, attaches);

        Ok(SegmentHandle {
            block,
            owned: false,
        })
    }

    /// Create in the root, attach everywhere else.
    pub fn create_or_attach(&self, name: &str, size: Size) -> Result<SegmentHandle, ShmError> {
        match self.create(name, size) {
            Ok(handle) => Ok(handle),
            Err(ShmError::SegmentExists(_)) => self.attach(name),
            Err(e) => Err(e),
        }
    }

    #[inline]
    pub fn exists(&self, name: &str) -> bool {
        self.segments.contains_key(name)
    }

    /// Destroy a segment through its owning handle. Called exactly once
    /// per segment, when the last referring configuration is torn down.
    pub fn destroy(&self, handle: &SegmentHandle) -> Result<(), ShmError> {
        if !handle.owned {
            return Err(ShmError::NotOwner(handle.name().to_string()));
        }
        let name = handle.name();
        if self.segments.remove(name).is_none() {
            warn!("Segment '{}' already destroyed", name);
            return Err(ShmError::SegmentNotFound(name.to_string()));
        }
        info!(
            "Destroyed shared segment '{}' (reclaimed {} bytes)",
            name,
            handle.size()
        );
        Ok(())
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

impl Default for SharedSegmentRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_attach() {
        let runtime = SharedSegmentRuntime::new();
        let owner = runtime.create("host:80/stats", 4096).unwrap();
        assert!(owner.is_owner());

        let child = runtime.attach("host:80/stats").unwrap();
        assert!(!child.is_owner());

        owner.write(0, b"counter").unwrap();
        assert_eq!(child.read(0, 7).unwrap(), b"counter");
    }

    #[test]
    fn double_create_fails() {
        let runtime = SharedSegmentRuntime::new();
        runtime.create("host:80/stats", 4096).unwrap();
        assert!(matches!(
            runtime.create("host:80/stats", 4096),
            Err(ShmError::SegmentExists(_))
        ));
    }

    #[test]
    fn attach_without_create_fails() {
        let runtime = SharedSegmentRuntime::new();
        assert!(matches!(
            runtime.attach("missing"),
            Err(ShmError::SegmentNotFound(_))
        ));
    }

    #[test]
    fn child_handle_cannot_destroy() {
        let runtime = SharedSegmentRuntime::new();
        let _owner = runtime.create("host:80/stats", 4096).unwrap();
        let child = runtime.attach("host:80/stats").unwrap();
        assert!(matches!(
            runtime.destroy(&child),
            Err(ShmError::NotOwner(_))
        ));
        assert!(runtime.exists("host:80/stats"));
    }

    #[test]
    fn out_of_range_write_rejected() {
        let runtime = SharedSegmentRuntime::new();
        let owner = runtime.create("host:80/buf", 8).unwrap();
        let err = owner.write(4, b"too long").unwrap_err();
        assert!(matches!(err, ShmError::InvalidRange { .. }));
    }
}
