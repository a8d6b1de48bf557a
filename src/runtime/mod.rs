//! Runtime module - container lifecycle behind a trait.
//!
//! The client only needs three operations from the container runtime:
//! create, start and remove. [`ContainerRuntime`] is that seam;
//! [`DockerRuntime`] implements it against the Docker Engine API.

mod docker;

use std::collections::HashMap;

use async_trait::async_trait;
pub use bollard::models::HostConfig;

use crate::error::Result;

pub use docker::DockerRuntime;

/// Everything needed to create the plugin container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    /// Image reference, e.g. `docker-plugin:latest`.
    pub image: String,
    /// Container name; the runtime picks one when `None`.
    pub name: Option<String>,
    /// Keep stdin open. Required for RPC requests to reach the container.
    pub open_stdin: bool,
    /// Environment as `KEY=value` entries.
    pub env: Vec<String>,
    /// Command override; the image default is used when `None`.
    pub cmd: Option<Vec<String>>,
    /// Container labels.
    pub labels: HashMap<String, String>,
    /// Host-side settings (mounts, resources, network mode, ...).
    pub host_config: HostConfig,
}

impl ContainerSpec {
    /// Spec for `image` with stdin kept open and everything else default.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            open_stdin: true,
            ..Self::default()
        }
    }
}

/// Container lifecycle operations used by the client.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a container and return its runtime-assigned ID.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Start a created container.
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Remove a container, killing it first when `force` is set.
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;
}
