//! Protocol module - attach stream framing and demultiplexing.
//!
//! This module implements the runtime side of the attach stream:
//! - 8-byte frame header encoding/decoding
//! - Demultiplexer splitting stdout from stderr/stdin frames
//! - Shared stderr accumulator

mod demux;
mod stderr;
mod wire_format;

pub use demux::StreamDemuxer;
pub use stderr::StderrBuffer;
pub use wire_format::{build_frame, StreamHeader, StreamType, HEADER_SIZE};
