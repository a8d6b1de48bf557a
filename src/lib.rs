//! # dockerpc
//!
//! Run a program inside a Docker container and call it over JSON-RPC
//! through the container's attached stdio.
//!
//! ## Architecture
//!
//! - **Lifecycle** (Docker Engine API): create, start and force-remove the container
//! - **Transport** (attach upgrade): the hijacked HTTP connection carries stdio
//! - **Demultiplexer**: splits the attach stream into stdout (RPC replies)
//!   and stderr (diagnostics, buffered per call)
//! - **RPC**: JSON-RPC 1.0 requests written to stdin, responses read from stdout
//!
//! ## Example
//!
//! ```ignore
//! use dockerpc::Client;
//!
//! #[tokio::main]
//! async fn main() -> dockerpc::Result<()> {
//!     let mut client = Client::new("XXX-test", "docker-plugin:latest", "tcp://192.168.99.100:2376");
//!     client.start().await?;
//!
//!     let reply: String = client.call("Plugin.SayHi", &"jen").await?;
//!     println!("{}", reply);
//!     eprint!("{}", client.std_error_lossy());
//!
//!     client.close().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod rpc;
pub mod runtime;
pub mod transport;

mod client;

pub use client::{Client, ClientBuilder, ClientState};
pub use config::TlsPaths;
pub use error::{DockerpcError, Result};
pub use runtime::{ContainerRuntime, ContainerSpec, DockerRuntime};
pub use transport::AttachOptions;
