//! Docker Engine implementation of [`ContainerRuntime`] using `bollard`.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
};
use bollard::{Docker, API_DEFAULT_VERSION};

use super::{ContainerRuntime, ContainerSpec};
use crate::config::{TlsPaths, DEFAULT_API_TIMEOUT_SECS};
use crate::error::{DockerpcError, Result};

/// Lifecycle client for a Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to `endpoint`, over TLS when `tls` is set.
    ///
    /// No request is made yet; the first lifecycle call opens the connection.
    ///
    /// # Errors
    ///
    /// `LifecycleFailed` if the endpoint or the TLS material is rejected.
    pub fn connect(endpoint: &str, tls: Option<&TlsPaths>) -> Result<Self> {
        let docker = match tls {
            Some(paths) => {
                // bollard builds its config from the process-wide provider.
                let _ = rustls::crypto::ring::default_provider().install_default();
                Docker::connect_with_ssl(
                    endpoint,
                    &paths.key,
                    &paths.cert,
                    &paths.ca,
                    DEFAULT_API_TIMEOUT_SECS,
                    API_DEFAULT_VERSION,
                )
            }
            None => Docker::connect_with_http(endpoint, DEFAULT_API_TIMEOUT_SECS, API_DEFAULT_VERSION),
        }
        .map_err(|e| {
            DockerpcError::LifecycleFailed(format!("Cannot connect to {}: {}", endpoint, e))
        })?;

        Ok(Self { docker })
    }

    /// Wrap an existing bollard client.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    /// Get a reference to the bollard client.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

fn container_config(spec: &ContainerSpec) -> Config<String> {
    Config {
        image: Some(spec.image.clone()),
        open_stdin: Some(spec.open_stdin),
        env: (!spec.env.is_empty()).then(|| spec.env.clone()),
        cmd: spec.cmd.clone(),
        labels: (!spec.labels.is_empty()).then(|| spec.labels.clone()),
        host_config: Some(spec.host_config.clone()),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let options = spec.name.clone().map(|name| CreateContainerOptions {
            name,
            platform: None,
        });

        let created = self
            .docker
            .create_container(options, container_config(spec))
            .await
            .map_err(|e| {
                DockerpcError::LifecycleFailed(format!(
                    "Create container from {} failed: {}",
                    spec.image, e
                ))
            })?;

        for warning in &created.warnings {
            tracing::warn!(id = %created.id, "Docker: {}", warning);
        }
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| {
                DockerpcError::LifecycleFailed(format!("Start container {} failed: {}", id, e))
            })
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| {
                DockerpcError::LifecycleFailed(format!("Remove container {} failed: {}", id, e))
            })
    }
}
