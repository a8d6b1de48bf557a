//! Transport module - reaching the daemon and hijacking the attach stream.
//!
//! Provides:
//! - Endpoint parsing and TCP/TLS dialing
//! - TLS connector construction from PEM files
//! - The attach upgrade handshake

mod attach;
mod dial;
mod tls;

pub use attach::{AttachOptions, AttachSession, AttachedStream};
pub use dial::{dial, AsyncStream, BoxedStream, Endpoint, DEFAULT_HTTP_PORT, DEFAULT_TLS_PORT};
pub use tls::load_connector;
