//! RPC transport adapter.
//!
//! Drives [`JsonRpcCodec`] over a [`StreamDemuxer`]: requests go out as raw
//! stdin bytes, responses are assembled from stdout frames. One call at a
//! time; `&mut self` keeps two calls from interleaving on the wire.

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{JsonRpcCodec, Response};
use crate::error::{DockerpcError, Result};
use crate::protocol::{StderrBuffer, StreamDemuxer};

/// Default size of the scratch buffer handed to the demultiplexer (64KB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Synchronous-style RPC client over a demultiplexed attach stream.
pub struct RpcClient<S> {
    /// Framing layer; owns the connection.
    demuxer: StreamDemuxer<S>,
    /// Stdout bytes not yet decoded into a response.
    pending: BytesMut,
    /// Scratch buffer for raw reads.
    scratch: Vec<u8>,
    /// Sequence number for the next request.
    next_id: u64,
    /// Set while a request is being written; still set if that write was
    /// abandoned, which leaves stdin holding a partial request.
    write_in_progress: bool,
}

impl<S> RpcClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create an RPC client with the default read buffer size.
    pub fn new(demuxer: StreamDemuxer<S>) -> Self {
        Self::with_read_buffer(demuxer, DEFAULT_READ_BUFFER_SIZE)
    }

    /// Create an RPC client with a custom read buffer size (minimum 1 byte).
    pub fn with_read_buffer(demuxer: StreamDemuxer<S>, size: usize) -> Self {
        Self {
            demuxer,
            pending: BytesMut::new(),
            scratch: vec![0u8; size.max(1)],
            next_id: 0,
            write_in_progress: false,
        }
    }

    /// Call `method` with `args` and wait for the typed reply.
    ///
    /// Clears the stderr buffer first, so afterwards it holds only what the
    /// container logged during this call.
    ///
    /// # Cancellation
    ///
    /// Dropping the future while the request is still being written (e.g.
    /// under `tokio::time::timeout`) leaves a partial request on stdin. The
    /// stream is then out of sync: the next call shuts it down and fails with
    /// `ConnectionClosed`. Dropping it while waiting for the reply is fine;
    /// the late reply is skipped by id.
    ///
    /// # Errors
    ///
    /// - `RemoteCallFailed` if the server returned an error
    /// - `Json` if the request cannot be encoded or a stdout line is not a
    ///   valid response (the line is dropped, later calls can succeed)
    /// - `ProtocolFraming` / `ConnectionClosed` / `Io` from the stream
    pub async fn call<A, R>(&mut self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        if self.write_in_progress {
            tracing::warn!("Previous request was cut off mid-write; closing the stream");
            self.demuxer.close().await?;
            return Err(DockerpcError::ConnectionClosed);
        }
        self.demuxer.stderr().clear();

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let request = JsonRpcCodec::encode_request(id, method, args)?;
        tracing::debug!(method, id, bytes = request.len(), "Sending RPC request");
        self.write_in_progress = true;
        self.demuxer.write_all(&request).await?;
        self.write_in_progress = false;

        loop {
            let response = self.read_response().await?;
            if response.id != id {
                tracing::warn!(
                    expected = id,
                    received = response.id,
                    "Discarding RPC response for unknown request"
                );
                continue;
            }
            tracing::debug!(method, id, error = response.is_error(), "RPC response");
            return response.into_result();
        }
    }

    /// Read stdout until one complete response is buffered.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some(response) = JsonRpcCodec::decode_response(&mut self.pending)? {
                return Ok(response);
            }

            let n = self.demuxer.read(&mut self.scratch).await?;
            // Zero means the chunk went to stderr or was stdin echo.
            if n > 0 {
                self.pending.extend_from_slice(&self.scratch[..n]);
            }
        }
    }

    /// Close the underlying connection. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        self.demuxer.close().await
    }

    /// Handle to the stderr accumulator.
    pub fn stderr(&self) -> &StderrBuffer {
        self.demuxer.stderr()
    }

    /// Sequence number the next call will use.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Get a reference to the demultiplexer.
    pub fn demuxer(&self) -> &StreamDemuxer<S> {
        &self.demuxer
    }
}
