//! Attach stream wire format.
//!
//! Every chunk of container output on a non-TTY attach stream is preceded
//! by an 8-byte header:
//! ```text
//! ┌────────┬──────────┬──────────┐
//! │ Stream │ Reserved │ Length   │
//! │ 1 byte │ 3 bytes  │ 4 bytes  │
//! │        │ (zero)   │ uint32 BE│
//! └────────┴──────────┴──────────┘
//! ```
//!
//! The write side (our stdin) carries raw bytes with no framing.

use crate::error::{DockerpcError, Result};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Logical channel carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StreamType {
    /// Echoed stdin. Carries nothing the caller needs.
    Stdin = 0,
    /// Container stdout: the RPC response stream.
    Stdout = 1,
    /// Container stderr: diagnostics, siphoned into the error buffer.
    Stderr = 2,
}

impl StreamType {
    /// Tag byte as it appears on the wire.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for StreamType {
    type Error = DockerpcError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(StreamType::Stdin),
            1 => Ok(StreamType::Stdout),
            2 => Ok(StreamType::Stderr),
            other => Err(DockerpcError::ProtocolFraming(format!(
                "Unsupported stream type: {}",
                other
            ))),
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Channel the payload belongs to.
    pub stream: StreamType,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl StreamHeader {
    /// Create a new header.
    pub fn new(stream: StreamType, payload_length: u32) -> Self {
        Self {
            stream,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian length, reserved bytes zeroed).
    ///
    /// # Example
    ///
    /// ```
    /// use dockerpc::protocol::{StreamHeader, StreamType};
    ///
    /// let bytes = StreamHeader::new(StreamType::Stderr, 5).encode();
    /// assert_eq!(bytes, [2, 0, 0, 0, 0, 0, 0, 5]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.stream.as_u8();
        buf[4..8].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode a header from exactly [`HEADER_SIZE`] bytes.
    ///
    /// Reserved bytes are ignored. Fails with `ProtocolFraming` if the buffer
    /// is short or the stream tag is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use dockerpc::protocol::{StreamHeader, StreamType};
    ///
    /// let header = StreamHeader::decode(&[1, 0, 0, 0, 0, 0, 1, 0]).unwrap();
    /// assert_eq!(header.stream, StreamType::Stdout);
    /// assert_eq!(header.payload_length, 256);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(DockerpcError::ProtocolFraming(format!(
                "Expected {} byte header, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }
        let stream = StreamType::try_from(buf[0])?;
        let payload_length = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok(Self {
            stream,
            payload_length,
        })
    }
}

/// Build a complete frame (header + payload) as a single byte vector.
///
/// Useful when emulating the runtime side of an attach stream.
///
/// # Panics
///
/// Panics if `payload` is longer than `u32::MAX` bytes.
pub fn build_frame(stream: StreamType, payload: &[u8]) -> Vec<u8> {
    let length = u32::try_from(payload.len()).expect("payload exceeds u32::MAX");
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&StreamHeader::new(stream, length).encode());
    buf.extend_from_slice(payload);
    buf
}
