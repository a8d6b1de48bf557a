//! Shared accumulator for stderr frames.
//!
//! The client owns a [`StderrBuffer`] and hands a clone to the demultiplexer,
//! which is the only writer. Clones share the same storage.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};

/// Append-only byte buffer for container stderr, reset per call.
#[derive(Debug, Clone, Default)]
pub struct StderrBuffer {
    inner: Arc<Mutex<BytesMut>>,
}

impl StderrBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        // Poisoning is harmless: every critical section is a single BytesMut op.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append stderr bytes.
    pub fn append(&self, data: &[u8]) {
        self.lock().extend_from_slice(data);
    }

    /// Drop all buffered bytes.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Copy of the current contents. Does not clear.
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock())
    }

    /// Current contents decoded as UTF-8, replacing invalid sequences.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_accumulates() {
        let buf = StderrBuffer::new();
        buf.append(b"first ");
        buf.append(b"second");

        assert_eq!(&buf.snapshot()[..], b"first second");
        assert_eq!(buf.len(), 12);
    }

    #[test]
    fn test_snapshot_does_not_clear() {
        let buf = StderrBuffer::new();
        buf.append(b"warn");

        let _ = buf.snapshot();
        assert_eq!(&buf.snapshot()[..], b"warn");
    }

    #[test]
    fn test_clones_share_storage() {
        let owner = StderrBuffer::new();
        let writer = owner.clone();

        writer.append(b"from demuxer");
        assert_eq!(owner.to_string_lossy(), "from demuxer");

        owner.clear();
        assert!(writer.is_empty());
    }

    #[test]
    fn test_lossy_decoding() {
        let buf = StderrBuffer::new();
        buf.append(&[b'o', b'k', 0xFF]);
        assert_eq!(buf.to_string_lossy(), "ok\u{FFFD}");
    }
}
