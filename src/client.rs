//! Client builder and container session.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the container
//! and the connection. The [`Client`] manages the lifecycle:
//! 1. Create the container (stdin kept open)
//! 2. Start it
//! 3. Attach to its stdio and hijack the connection
//! 4. Issue RPC calls over the demultiplexed stream
//! 5. On close, force-remove the container and shut the stream
//!
//! # Example
//!
//! ```ignore
//! use dockerpc::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("my-plugin", "docker-plugin:latest", "tcp://127.0.0.1:2375");
//!     client.start().await?;
//!
//!     let reply: String = client.call("Plugin.SayHi", &"jen").await?;
//!     eprint!("{}", client.std_error_lossy());
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{docker_host_from_env, TlsPaths, DOCKER_HOST_ENV};
use crate::error::{DockerpcError, Result};
use crate::protocol::{StderrBuffer, StreamDemuxer};
use crate::rpc::{RpcClient, DEFAULT_READ_BUFFER_SIZE};
use crate::runtime::{ContainerRuntime, ContainerSpec, DockerRuntime, HostConfig};
use crate::transport::{load_connector, AttachOptions, AttachSession, AttachedStream, Endpoint};

/// Lifecycle state of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Constructed, or `start` failed. No live connection.
    Inert,
    /// Started and attached; calls are accepted.
    Active,
    /// `close` has run.
    Closed,
}

/// Where the TLS material comes from.
#[derive(Debug, Clone)]
enum TlsSource {
    /// `DOCKER_CERT_PATH`, read each time the client starts.
    Env,
    /// Explicit PEM files.
    Paths(TlsPaths),
    /// Plaintext.
    Disabled,
}

impl TlsSource {
    fn resolve(&self) -> Option<TlsPaths> {
        match self {
            TlsSource::Env => TlsPaths::from_env(),
            TlsSource::Paths(paths) => Some(paths.clone()),
            TlsSource::Disabled => None,
        }
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// Nothing touches the network until [`Client::start`].
pub struct ClientBuilder {
    spec: ContainerSpec,
    endpoint: String,
    tls: TlsSource,
    attach: AttachOptions,
    read_buffer_size: usize,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl ClientBuilder {
    /// Create a builder for `image`.
    ///
    /// The endpoint defaults to `DOCKER_HOST`, read now. TLS defaults to
    /// `DOCKER_CERT_PATH`, read at each [`Client::start`].
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            spec: ContainerSpec::new(image),
            endpoint: docker_host_from_env().unwrap_or_default(),
            tls: TlsSource::Env,
            attach: AttachOptions::default(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            runtime: None,
        }
    }

    /// Set the container name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.spec.name = (!name.is_empty()).then_some(name);
        self
    }

    /// Set the daemon endpoint, e.g. `tcp://192.168.99.100:2376`.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Use TLS with the given PEM files.
    pub fn tls(mut self, paths: TlsPaths) -> Self {
        self.tls = TlsSource::Paths(paths);
        self
    }

    /// Use plaintext even if `DOCKER_CERT_PATH` is set.
    pub fn without_tls(mut self) -> Self {
        self.tls = TlsSource::Disabled;
        self
    }

    /// Add an environment entry (`KEY=value`) for the container.
    pub fn env(mut self, entry: impl Into<String>) -> Self {
        self.spec.env.push(entry.into());
        self
    }

    /// Override the image command.
    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    /// Add a container label.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.labels.insert(key.into(), value.into());
        self
    }

    /// Set host-side container settings.
    pub fn host_config(mut self, host_config: HostConfig) -> Self {
        self.spec.host_config = host_config;
        self
    }

    /// Set the attach options. Default: stdin, stdout, stderr and stream.
    pub fn attach_options(mut self, options: AttachOptions) -> Self {
        self.attach = options;
        self
    }

    /// Set the size of the buffer used for each raw read.
    ///
    /// Default: 64KB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Use a custom lifecycle implementation instead of connecting to
    /// Docker at start.
    pub fn runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the client. No side effects.
    pub fn build(self) -> Client {
        Client {
            id: None,
            spec: self.spec,
            endpoint: self.endpoint,
            tls: self.tls,
            attach: self.attach,
            read_buffer_size: self.read_buffer_size,
            runtime: self.runtime,
            stderr: StderrBuffer::new(),
            rpc: None,
            state: ClientState::Inert,
        }
    }
}

/// RPC session with a program running inside a container.
///
/// One call at a time: every operation takes `&mut self`.
pub struct Client {
    /// Runtime-assigned container ID, once created.
    id: Option<String>,
    /// Container creation settings.
    spec: ContainerSpec,
    /// Daemon endpoint.
    endpoint: String,
    /// TLS material source.
    tls: TlsSource,
    /// Streams requested from the attach endpoint.
    attach: AttachOptions,
    /// Raw read size for the RPC adapter.
    read_buffer_size: usize,
    /// Lifecycle collaborator; connected lazily on start.
    runtime: Option<Arc<dyn ContainerRuntime>>,
    /// Container stderr since the start of the last call.
    stderr: StderrBuffer,
    /// Live RPC handle while active.
    rpc: Option<RpcClient<AttachedStream>>,
    /// Lifecycle state.
    state: ClientState,
}

impl Client {
    /// Create an inert client.
    ///
    /// An empty `name` lets the runtime choose one. TLS is enabled when
    /// `DOCKER_CERT_PATH` is set at the time [`start`](Self::start) runs.
    pub fn new(name: impl Into<String>, image: impl Into<String>, endpoint: impl Into<String>) -> Self {
        ClientBuilder::new(image).name(name).endpoint(endpoint).build()
    }

    /// Create an inert client using `DOCKER_HOST` as the endpoint.
    ///
    /// # Errors
    ///
    /// `AttachFailed` if `DOCKER_HOST` is unset.
    pub fn from_env(name: impl Into<String>, image: impl Into<String>) -> Result<Self> {
        let endpoint = docker_host_from_env().ok_or_else(|| {
            DockerpcError::AttachFailed(format!("{} is not set", DOCKER_HOST_ENV))
        })?;
        Ok(Self::new(name, image, endpoint))
    }

    /// Create a client builder.
    pub fn builder(image: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(image)
    }

    /// Create, start and attach to the container.
    ///
    /// On failure the client stays [`ClientState::Inert`] and the first error
    /// is returned. A container that was already created is not removed
    /// here; call [`close`](Self::close) to clean it up. Starting again
    /// without closing first force-removes that container before creating a
    /// new one.
    pub async fn start(&mut self) -> Result<()> {
        if self.state == ClientState::Active {
            return Err(DockerpcError::AlreadyStarted);
        }
        self.state = ClientState::Inert;

        // Fail on a bad endpoint before creating anything.
        let endpoint = Endpoint::parse(&self.endpoint)?;
        let tls = self.tls.resolve();

        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => {
                let runtime: Arc<dyn ContainerRuntime> =
                    Arc::new(DockerRuntime::connect(&self.endpoint, tls.as_ref())?);
                self.runtime = Some(runtime.clone());
                runtime
            }
        };

        // Left over from a failed start.
        self.remove_container().await;

        let id = runtime.create_container(&self.spec).await?;
        tracing::info!(id = %id, image = %self.spec.image, "Created container");
        self.id = Some(id.clone());

        runtime.start_container(&id).await?;
        tracing::info!(id = %id, "Started container");

        let connector = tls.as_ref().map(load_connector).transpose()?;
        let stream = AttachSession::new(endpoint, connector)
            .attach(&id, &self.attach)
            .await?;

        let demuxer = StreamDemuxer::new(stream, self.stderr.clone());
        self.rpc = Some(RpcClient::with_read_buffer(demuxer, self.read_buffer_size));
        self.state = ClientState::Active;
        Ok(())
    }

    /// Call `method` inside the container and wait for the reply.
    ///
    /// The stderr buffer is cleared first; afterwards [`std_error`](Self::std_error)
    /// holds what the container logged during this call, even on success.
    ///
    /// # Errors
    ///
    /// - `NotStarted` unless the client is active
    /// - `RemoteCallFailed` with the server's message
    /// - stream and codec errors from the transport
    pub async fn call<A, R>(&mut self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        match (self.state, self.rpc.as_mut()) {
            (ClientState::Active, Some(rpc)) => rpc.call(method, args).await,
            _ => Err(DockerpcError::NotStarted),
        }
    }

    /// Force-remove the container and close the RPC stream.
    ///
    /// Removal is best effort: a failure is logged and never returned. Only
    /// an error closing the stream is reported. Safe to call after a failed
    /// [`start`](Self::start) and more than once.
    pub async fn close(&mut self) -> Result<()> {
        self.remove_container().await;

        self.state = ClientState::Closed;
        match self.rpc.take() {
            Some(mut rpc) => rpc.close().await,
            None => Ok(()),
        }
    }

    /// Force-remove the recorded container, if any. Failures are logged.
    async fn remove_container(&mut self) {
        if let (Some(runtime), Some(id)) = (&self.runtime, self.id.take()) {
            match runtime.remove_container(&id, true).await {
                Ok(()) => tracing::info!(id = %id, "Removed container"),
                Err(e) => tracing::warn!(id = %id, "Ignoring container removal failure: {}", e),
            }
        }
    }

    /// Stderr bytes logged by the container since the last call began.
    pub fn std_error(&self) -> Bytes {
        self.stderr.snapshot()
    }

    /// [`std_error`](Self::std_error) decoded as UTF-8, lossily.
    pub fn std_error_lossy(&self) -> String {
        self.stderr.to_string_lossy()
    }

    /// Runtime-assigned container ID, once created.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Requested container name, if any.
    pub fn name(&self) -> Option<&str> {
        self.spec.name.as_deref()
    }

    /// Image the container is created from.
    pub fn image(&self) -> &str {
        &self.spec.image
    }

    /// Daemon endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Container labels that will be applied on start.
    pub fn labels(&self) -> &HashMap<String, String> {
        &self.spec.labels
    }

    /// Check if `start` would connect with TLS, given the current environment.
    pub fn is_tls(&self) -> bool {
        self.tls.resolve().is_some()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Check if calls are accepted.
    pub fn is_active(&self) -> bool {
        self.state == ClientState::Active
    }
}
