//! Codec module - request/response encoding carried over the attach stream.
//!
//! - [`JsonRpcCodec`] - JSON-RPC 1.0, matching Go's `net/rpc/jsonrpc`
//!
//! # Design
//!
//! Like the framing layer, the codec is a marker struct with static methods.
//! It knows nothing about Docker; it only sees the demultiplexed stdout bytes.

mod jsonrpc;

pub use jsonrpc::{JsonRpcCodec, Response};
