//! Accumulator for the part currently being assembled

use bytes::{Bytes, BytesMut};

/// Upper bound on what a fresh buffer preallocates
const MAX_PREALLOC: usize = 64 * 1024 * 1024;

/// Byte buffer for one part.
///
/// Flushing hands the contents out as immutable `Bytes` and installs a new
/// allocation, so a payload given to the store is never mutated afterwards.
#[derive(Debug)]
pub struct PartBuffer {
    data: BytesMut,
    capacity_hint: usize,
}

impl PartBuffer {
    /// Create a buffer sized for parts of `threshold` bytes
    pub fn with_capacity(threshold: usize) -> Self {
        let capacity_hint = threshold.min(MAX_PREALLOC);
        PartBuffer {
            data: BytesMut::with_capacity(capacity_hint),
            capacity_hint,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True once the buffer holds at least `threshold` bytes
    pub fn is_full(&self, threshold: usize) -> bool {
        self.data.len() >= threshold
    }

    /// Replace the buffer with a fresh one, returning the old contents
    pub fn take(&mut self) -> Bytes {
        std::mem::replace(&mut self.data, BytesMut::with_capacity(self.capacity_hint)).freeze()
    }

    /// Put back contents handed out by [`take`](Self::take) after a failed
    /// upload. They go in front of anything appended since.
    pub fn restore(&mut self, payload: Bytes) {
        let mut data = BytesMut::with_capacity(self.capacity_hint.max(payload.len() + self.data.len()));
        data.extend_from_slice(&payload);
        data.extend_from_slice(&self.data);
        self.data = data;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}
