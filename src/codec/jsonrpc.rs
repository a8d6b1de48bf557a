//! JSON-RPC 1.0 client codec.
//!
//! Wire compatible with Go's `net/rpc/jsonrpc` servers, which is what plugin
//! containers typically run:
//!
//! ```text
//! → {"method":"Plugin.SayHi","params":["jen"],"id":0}\n
//! ← {"id":0,"result":"Hi jen","error":null}\n
//! ```
//!
//! `params` always wraps the single argument in a one-element array.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use dockerpc::codec::JsonRpcCodec;
//!
//! let request = JsonRpcCodec::encode_request(7, "Plugin.SayHi", &"jen").unwrap();
//! assert!(request.ends_with(b"\n"));
//!
//! let mut buf = BytesMut::from(&br#"{"id":7,"result":"Hi jen","error":null}"#[..]);
//! let response = JsonRpcCodec::decode_response(&mut buf).unwrap().unwrap();
//! let reply: String = response.into_result().unwrap();
//! assert_eq!(reply, "Hi jen");
//! ```

use bytes::{Buf, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DockerpcError, Result};

/// Outgoing request as serialized on the wire.
#[derive(Debug, Serialize)]
struct Request<'a, A: Serialize> {
    method: &'a str,
    params: [&'a A; 1],
    id: u64,
}

/// Decoded response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Response {
    /// Sequence number echoed from the request.
    pub id: u64,
    /// Result value; `null` when `error` is set.
    #[serde(default)]
    pub result: Value,
    /// Error value; `null` on success.
    #[serde(default)]
    pub error: Value,
}

impl Response {
    /// Convert into the typed result, or `RemoteCallFailed` if the server
    /// reported an error.
    ///
    /// String errors are surfaced verbatim. Any other non-null error value is
    /// rendered as JSON.
    pub fn into_result<R: DeserializeOwned>(self) -> Result<R> {
        match self.error {
            Value::Null => Ok(serde_json::from_value(self.result)?),
            Value::String(message) => Err(DockerpcError::RemoteCallFailed(message)),
            other => Err(DockerpcError::RemoteCallFailed(format!(
                "invalid error {}",
                other
            ))),
        }
    }

    /// Check if the server reported an error.
    pub fn is_error(&self) -> bool {
        !self.error.is_null()
    }
}

/// JSON-RPC 1.0 codec for the client side.
pub struct JsonRpcCodec;

impl JsonRpcCodec {
    /// Encode a request, newline terminated.
    ///
    /// # Errors
    ///
    /// Returns error if `params` cannot be serialized.
    pub fn encode_request<A: Serialize>(id: u64, method: &str, params: &A) -> Result<Vec<u8>> {
        let request = Request {
            method,
            params: [params],
            id,
        };
        let mut bytes = serde_json::to_vec(&request)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Try to decode one response from the front of `buf`.
    ///
    /// Returns:
    /// - `Ok(Some(response))` and consumes its bytes if a complete value is buffered
    /// - `Ok(None)` if more data is needed (leading whitespace is discarded)
    /// - `Err(...)` if the buffered bytes are not a valid response; the
    ///   offending line is dropped so the next decode starts on fresh input
    pub fn decode_response(buf: &mut BytesMut) -> Result<Option<Response>> {
        let mut stream = serde_json::Deserializer::from_slice(&buf[..]).into_iter::<Response>();

        match stream.next() {
            Some(Ok(response)) => {
                let consumed = stream.byte_offset();
                buf.advance(consumed);
                Ok(Some(response))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => {
                match buf.iter().position(|&b| b == b'\n') {
                    Some(end) => buf.advance(end + 1),
                    None => buf.clear(),
                }
                Err(DockerpcError::Json(e))
            }
            None => {
                // Only whitespace so far
                buf.clear();
                Ok(None)
            }
        }
    }
}
