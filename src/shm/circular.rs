/*!
 * Shared Circular Message Buffer
 * Fixed-size shared log of server messages, one per host identifier
 */

use super::runtime::{SegmentHandle, SharedSegmentRuntime};
use super::types::ShmError;
use crate::core::types::Size;
use log::debug;
use parking_lot::Mutex;

// Segment layout: 8-byte running write total, then the ring itself.
const HEADER_SIZE: Size = 8;

/// Circular message buffer backed by a shared segment.
///
/// The root process creates the segment and zeroes the header; children
/// attach and append. Old messages are overwritten once the ring fills.
pub struct SharedCircularBuffer {
    handle: SegmentHandle,
    capacity: Size,
    // Serializes read-modify-write of the header across writers
    write_lock: Mutex<()>,
}

impl SharedCircularBuffer {
    /// Create the buffer segment (root process).
    pub fn create(
        runtime: &SharedSegmentRuntime,
        name: &str,
        size: Size,
    ) -> Result<Self, ShmError> {
        if size <= HEADER_SIZE {
            return Err(ShmError::InvalidSize(format!(
                "Buffer size {} does not fit the {} byte header",
                size, HEADER_SIZE
            )));
        }
        let handle = runtime.create(name, size)?;
        handle.write(0, &0u64.to_le_bytes())?;
        Ok(Self::from_handle(handle))
    }

    /// Attach to a buffer the root already created (child process).
    pub fn attach(runtime: &SharedSegmentRuntime, name: &str) -> Result<Self, ShmError> {
        let handle = runtime.attach(name)?;
        Ok(Self::from_handle(handle))
    }

    /// Create in the first process to ask, attach everywhere else.
    pub fn open(
        runtime: &SharedSegmentRuntime,
        name: &str,
        size: Size,
    ) -> Result<Self, ShmError> {
        if runtime.exists(name) {
            Self::attach(runtime, name)
        } else {
            Self::create(runtime, name, size)
        }
    }

    fn from_handle(handle: SegmentHandle) -> Self {
        let capacity = handle.size() - HEADER_SIZE;
        Self {
            handle,
            capacity,
            write_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn capacity(&self) -> Size {
        self.capacity
    }

    #[inline]
    pub fn is_owner(&self) -> bool {
        self.handle.is_owner()
    }

    pub(crate) fn handle(&self) -> &SegmentHandle {
        &self.handle
    }

    fn total_written(&self) -> Result<u64, ShmError> {
        let bytes = self.handle.read(0, HEADER_SIZE)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Append one message, newline-terminated. Messages longer than the
    /// ring are truncated to its final `capacity` bytes.
    pub fn write_message(&self, message: &str) -> Result<(), ShmError> {
        let _guard = self.write_lock.lock();

        let mut bytes = message.as_bytes().to_vec();
        bytes.push(b'\n');
        if bytes.len() > self.capacity {
            let start = bytes.len() - self.capacity;
            bytes.drain(..start);
        }

        let total = self.total_written()?;
        let mut pos = (total % self.capacity as u64) as Size;
        let mut remaining: &[u8] = &bytes;
        while !remaining.is_empty() {
            let chunk = remaining.len().min(self.capacity - pos);
            self.handle.write(HEADER_SIZE + pos, &remaining[..chunk])?;
            remaining = &remaining[chunk..];
            pos = (pos + chunk) % self.capacity;
        }

        self.handle
            .write(0, &(total + bytes.len() as u64).to_le_bytes())?;
        Ok(())
    }

    /// Current buffer contents, oldest message first.
    pub fn snapshot(&self) -> Result<String, ShmError> {
        let total = self.total_written()?;
        let contents = if total <= self.capacity as u64 {
            self.handle.read(HEADER_SIZE, total as Size)?
        } else {
            let split = (total % self.capacity as u64) as Size;
            let mut tail = self.handle.read(HEADER_SIZE + split, self.capacity - split)?;
            let head = self.handle.read(HEADER_SIZE, split)?;
            tail.extend_from_slice(&head);
            tail
        };
        Ok(String::from_utf8_lossy(&contents).into_owned())
    }

    /// Reset the buffer to empty.
    pub fn clear(&self) -> Result<(), ShmError> {
        let _guard = self.write_lock.lock();
        debug!("Clearing message buffer '{}'", self.handle.name());
        self.handle.write(0, &0u64.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(capacity: Size) -> (SharedSegmentRuntime, SharedCircularBuffer) {
        let runtime = SharedSegmentRuntime::new();
        let buf =
            SharedCircularBuffer::create(&runtime, "host:80/messages", capacity + HEADER_SIZE)
                .unwrap();
        (runtime, buf)
    }

    #[test]
    fn messages_appear_in_order() {
        let (_rt, buf) = buffer(256);
        buf.write_message("first").unwrap();
        buf.write_message("second").unwrap();
        assert_eq!(buf.snapshot().unwrap(), "first\nsecond\n");
    }

    #[test]
    fn ring_wraps_and_keeps_newest() {
        let (_rt, buf) = buffer(16);
        buf.write_message("aaaaaaa").unwrap(); // 8 bytes with newline
        buf.write_message("bbbbbbb").unwrap();
        buf.write_message("ccccccc").unwrap();
        let snapshot = buf.snapshot().unwrap();
        assert!(snapshot.contains("ccccccc"));
        assert!(!snapshot.contains("aaaaaaa"));
    }

    #[test]
    fn attached_buffer_sees_root_writes() {
        let runtime = SharedSegmentRuntime::new();
        let root =
            SharedCircularBuffer::create(&runtime, "host:80/messages", 128 + HEADER_SIZE).unwrap();
        root.write_message("from root").unwrap();

        let child = SharedCircularBuffer::attach(&runtime, "host:80/messages").unwrap();
        assert!(!child.is_owner());
        assert_eq!(child.snapshot().unwrap(), "from root\n");
    }

    #[test]
    fn clear_resets_contents() {
        let (_rt, buf) = buffer(64);
        buf.write_message("noise").unwrap();
        buf.clear().unwrap();
        assert_eq!(buf.snapshot().unwrap(), "");
    }
}
