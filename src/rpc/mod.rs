//! RPC module - binds the codec to the demultiplexed attach stream.

mod client;

pub use client::{RpcClient, DEFAULT_READ_BUFFER_SIZE};
