//! Demultiplexer for the attach stream.
//!
//! Implements a small state machine over a raw duplex connection:
//! - `WaitingForHeader`: the next raw read must yield a full 8-byte header
//! - `InPayload`: header consumed, N payload bytes of one stream still due
//!
//! Stdout payload is handed to the caller. Stderr payload is appended to a
//! [`StderrBuffer`]. Stdin payload is dropped. For the latter two `read`
//! reports zero bytes so the caller simply reads again.
//!
//! # Example
//!
//! ```ignore
//! use dockerpc::protocol::{StderrBuffer, StreamDemuxer};
//!
//! let stderr = StderrBuffer::new();
//! let mut demuxer = StreamDemuxer::new(stream, stderr.clone());
//!
//! let mut buf = [0u8; 4096];
//! let n = demuxer.read(&mut buf).await?;
//! // buf[..n] is stdout only
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::stderr::StderrBuffer;
use super::wire_format::{StreamHeader, StreamType, HEADER_SIZE};
use crate::error::{DockerpcError, Result};

/// Parsing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Next read starts with a fresh header.
    WaitingForHeader,
    /// Continuing the payload of `stream`; `remaining` bytes still on the wire.
    InPayload { stream: StreamType, remaining: u32 },
}

/// Splits a multiplexed attach connection into stdout bytes and stderr text.
///
/// Owns the connection exclusively. Not meant for concurrent readers: one
/// logical call at a time drives it through `&mut self`.
pub struct StreamDemuxer<S> {
    /// The hijacked connection.
    inner: S,
    /// Current parsing state.
    state: State,
    /// Destination for stderr payload.
    stderr: StderrBuffer,
    /// Set once `close` has shut the connection down.
    closed: bool,
}

impl<S> StreamDemuxer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a raw attach connection.
    pub fn new(inner: S, stderr: StderrBuffer) -> Self {
        Self {
            inner,
            state: State::WaitingForHeader,
            stderr,
            closed: false,
        }
    }

    /// Read the next chunk of stdout into `buf`.
    ///
    /// Returns the number of stdout bytes placed in `buf`. Zero means the
    /// chunk belonged to stdin or stderr (or was an empty frame); read again.
    ///
    /// # Errors
    ///
    /// - `ProtocolFraming` if a header read returns fewer than 8 bytes or
    ///   carries an unknown stream tag. State is left untouched.
    /// - `ConnectionClosed` if the peer closes the stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let (stream, remaining) = match self.state {
            State::InPayload { stream, remaining } => (stream, remaining),
            State::WaitingForHeader => {
                let header = self.read_header().await?;
                tracing::trace!(
                    stream = ?header.stream,
                    length = header.payload_length,
                    "Attach frame header"
                );
                (header.stream, header.payload_length)
            }
        };

        if remaining == 0 {
            self.state = State::WaitingForHeader;
            return Ok(0);
        }

        let want = buf.len().min(remaining as usize);
        let n = self.inner.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(DockerpcError::ConnectionClosed);
        }

        // n <= want <= remaining, so this cannot underflow.
        let left = remaining - n as u32;
        self.state = if left == 0 {
            State::WaitingForHeader
        } else {
            State::InPayload {
                stream,
                remaining: left,
            }
        };

        match stream {
            StreamType::Stdin => Ok(0),
            StreamType::Stdout => Ok(n),
            StreamType::Stderr => {
                self.stderr.append(&buf[..n]);
                Ok(0)
            }
        }
    }

    /// Consume one header with a single raw read.
    ///
    /// The header must arrive whole; a partial header is a framing error.
    async fn read_header(&mut self) -> Result<StreamHeader> {
        let mut raw = [0u8; HEADER_SIZE];
        let n = self.inner.read(&mut raw).await?;
        match n {
            0 => Err(DockerpcError::ConnectionClosed),
            HEADER_SIZE => StreamHeader::decode(&raw),
            short => Err(DockerpcError::ProtocolFraming(format!(
                "Expected {} byte header, got {}",
                HEADER_SIZE, short
            ))),
        }
    }

    /// Write raw bytes to the container's stdin.
    ///
    /// The attach stream takes stdin unframed. Returns bytes written.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(DockerpcError::ConnectionClosed);
        }
        Ok(self.inner.write(buf).await?)
    }

    /// Write all of `buf` to stdin and flush.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        if self.closed {
            return Err(DockerpcError::ConnectionClosed);
        }
        self.inner.write_all(buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the connection. Calling it again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Check if `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Handle to the stderr accumulator.
    pub fn stderr(&self) -> &StderrBuffer {
        &self.stderr
    }

    /// Payload bytes of the current frame not yet read (0 between frames).
    pub fn remaining(&self) -> u32 {
        match self.state {
            State::WaitingForHeader => 0,
            State::InPayload { remaining, .. } => remaining,
        }
    }

    /// Stream of the frame currently being read, if any.
    pub fn pending_stream(&self) -> Option<StreamType> {
        match self.state {
            State::WaitingForHeader => None,
            State::InPayload { stream, .. } => Some(stream),
        }
    }

    /// Get a reference to the underlying connection.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_frame;
    use tokio::io::{duplex, DuplexStream};

    fn demuxer(capacity: usize) -> (StreamDemuxer<DuplexStream>, DuplexStream, StderrBuffer) {
        let (client, server) = duplex(capacity);
        let stderr = StderrBuffer::new();
        (StreamDemuxer::new(client, stderr.clone()), server, stderr)
    }

    /// Read until `want` stdout bytes are collected.
    async fn read_stdout(demuxer: &mut StreamDemuxer<DuplexStream>, want: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while out.len() < want {
            let n = demuxer.read(&mut buf).await.unwrap();
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[tokio::test]
    async fn test_single_stdout_frame() {
        let (mut demuxer, mut server, stderr) = demuxer(4096);
        server
            .write_all(&build_frame(StreamType::Stdout, b"hello"))
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let n = demuxer.read(&mut buf).await.unwrap();

        assert_eq!(&buf[..n], b"hello");
        assert_eq!(demuxer.remaining(), 0);
        assert!(stderr.is_empty());
    }

    #[tokio::test]
    async fn test_stderr_then_stdout() {
        let (mut demuxer, mut server, stderr) = demuxer(4096);
        server
            .write_all(&build_frame(StreamType::Stderr, b"oops!"))
            .await
            .unwrap();
        server
            .write_all(&build_frame(StreamType::Stdout, b"{}"))
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        // Stderr frame reports nothing to the caller
        assert_eq!(demuxer.read(&mut buf).await.unwrap(), 0);
        assert_eq!(&stderr.snapshot()[..], b"oops!");

        let n = demuxer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"{}");
        assert_eq!(&stderr.snapshot()[..], b"oops!");
    }

    #[tokio::test]
    async fn test_stdin_frames_are_discarded() {
        let (mut demuxer, mut server, stderr) = demuxer(4096);
        server
            .write_all(&build_frame(StreamType::Stdin, b"echoed"))
            .await
            .unwrap();
        server
            .write_all(&build_frame(StreamType::Stdout, b"data"))
            .await
            .unwrap();

        let out = read_stdout(&mut demuxer, 4).await;
        assert_eq!(out, b"data");
        assert!(stderr.is_empty());
    }

    #[tokio::test]
    async fn test_payload_larger_than_buffer_continues_without_header() {
        let (mut demuxer, mut server, _stderr) = demuxer(4096);
        server
            .write_all(&build_frame(StreamType::Stdout, b"0123456789"))
            .await
            .unwrap();
        server
            .write_all(&build_frame(StreamType::Stdout, b"AB"))
            .await
            .unwrap();

        let mut buf = [0u8; 4];

        let n = demuxer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"0123");
        assert_eq!(demuxer.remaining(), 6);
        assert_eq!(demuxer.pending_stream(), Some(StreamType::Stdout));

        let n = demuxer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"4567");
        assert_eq!(demuxer.remaining(), 2);

        // Only the two bytes left in this frame, never the next header
        let n = demuxer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"89");
        assert_eq!(demuxer.remaining(), 0);
        assert_eq!(demuxer.pending_stream(), None);

        let n = demuxer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"AB");
    }

    #[tokio::test]
    async fn test_split_stderr_payload_accumulates() {
        let (mut demuxer, mut server, stderr) = demuxer(4096);
        server
            .write_all(&build_frame(StreamType::Stderr, b"a long warning"))
            .await
            .unwrap();

        let mut buf = [0u8; 3];
        while stderr.len() < 14 {
            assert_eq!(demuxer.read(&mut buf).await.unwrap(), 0);
        }
        assert_eq!(stderr.to_string_lossy(), "a long warning");
        assert_eq!(demuxer.remaining(), 0);
    }

    #[tokio::test]
    async fn test_zero_length_frame() {
        let (mut demuxer, mut server, _stderr) = demuxer(4096);
        server
            .write_all(&build_frame(StreamType::Stdout, b""))
            .await
            .unwrap();
        server
            .write_all(&build_frame(StreamType::Stdout, b"x"))
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(demuxer.read(&mut buf).await.unwrap(), 0);
        assert_eq!(demuxer.remaining(), 0);

        let n = demuxer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"x");
    }

    #[tokio::test]
    async fn test_short_header_is_framing_error() {
        let (mut demuxer, mut server, _stderr) = demuxer(4096);
        server.write_all(&[1, 0, 0]).await.unwrap();
        drop(server);

        let mut buf = [0u8; 16];
        let err = demuxer.read(&mut buf).await.unwrap_err();

        assert!(matches!(err, DockerpcError::ProtocolFraming(_)));
        assert!(err.to_string().contains("got 3"));
        assert_eq!(demuxer.remaining(), 0);
        assert_eq!(demuxer.pending_stream(), None);
    }

    #[tokio::test]
    async fn test_unknown_stream_tag_is_framing_error() {
        let (mut demuxer, mut server, _stderr) = demuxer(4096);
        server
            .write_all(&[9, 0, 0, 0, 0, 0, 0, 4, b'd', b'a', b't', b'a'])
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        let err = demuxer.read(&mut buf).await.unwrap_err();

        assert!(matches!(err, DockerpcError::ProtocolFraming(_)));
        assert_eq!(demuxer.pending_stream(), None);
    }

    #[tokio::test]
    async fn test_eof_at_frame_boundary() {
        let (mut demuxer, server, _stderr) = demuxer(4096);
        drop(server);

        let mut buf = [0u8; 16];
        let err = demuxer.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, DockerpcError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_eof_mid_payload() {
        let (mut demuxer, mut server, _stderr) = demuxer(4096);
        let frame = build_frame(StreamType::Stdout, b"truncated");
        server.write_all(&frame[..HEADER_SIZE + 3]).await.unwrap();
        drop(server);

        let mut buf = [0u8; 64];
        let n = demuxer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"tru");

        let err = demuxer.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, DockerpcError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_empty_buffer_reads_nothing() {
        let (mut demuxer, _server, _stderr) = demuxer(4096);
        let mut buf = [0u8; 0];
        assert_eq!(demuxer.read(&mut buf).await.unwrap(), 0);
        assert_eq!(demuxer.pending_stream(), None);
    }

    #[tokio::test]
    async fn test_stdout_never_contains_other_streams() {
        let (mut demuxer, mut server, stderr) = demuxer(64 * 1024);

        let mut expected = Vec::new();
        for i in 0..20u8 {
            let out = vec![b'o'; (i as usize) * 7 + 1];
            let err = vec![b'e'; (i as usize) % 5];
            let echo = vec![b'i'; 3];
            server
                .write_all(&build_frame(StreamType::Stdin, &echo))
                .await
                .unwrap();
            server
                .write_all(&build_frame(StreamType::Stdout, &out))
                .await
                .unwrap();
            server
                .write_all(&build_frame(StreamType::Stderr, &err))
                .await
                .unwrap();
            expected.extend_from_slice(&out);
        }

        let out = read_stdout(&mut demuxer, expected.len()).await;
        assert_eq!(out, expected);
        assert!(stderr.snapshot().iter().all(|&b| b == b'e'));
    }

    #[tokio::test]
    async fn test_write_is_unframed() {
        let (mut demuxer, mut server, _stderr) = demuxer(4096);
        demuxer.write_all(b"{\"id\":0}\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"{\"id\":0}\n");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut demuxer, mut server, _stderr) = demuxer(4096);

        demuxer.close().await.unwrap();
        demuxer.close().await.unwrap();
        assert!(demuxer.is_closed());

        // Peer observes EOF
        let mut buf = [0u8; 8];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);

        let err = demuxer.write_all(b"late").await.unwrap_err();
        assert!(matches!(err, DockerpcError::ConnectionClosed));
    }
}
