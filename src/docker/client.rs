use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::models::ContainerInspectResponse;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// The container runtime operations the lifecycle manager relies on.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create_container(&self, config: Config<String>) -> Result<String>;
    async fn start_container(&self, id: &str) -> Result<()>;
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse>;
    /// `timeout` is in seconds; `None` leaves it to the daemon.
    async fn stop_container(&self, id: &str, timeout: Option<i64>) -> Result<()>;
    async fn wait_container(&self, id: &str) -> Result<i64>;
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;
    /// Ids of all containers, running or not, carrying `label=true`.
    async fn list_managed_containers(&self, label: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerConfig {
    pub socket_path: Option<String>,
}

pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    pub async fn new(config: DockerConfig) -> Result<Self> {
        let docker = match config.socket_path {
            Some(socket) => Docker::connect_with_socket(&socket, 120, API_DEFAULT_VERSION)
                .with_context(|| format!("Failed to open Docker socket {socket}"))?,
            None => Docker::connect_with_local_defaults()
                .context("Failed to open default Docker connection")?,
        };

        let version = docker
            .version()
            .await
            .context("Failed to connect to Docker daemon")?;

        info!("Connected to Docker daemon version: {}", version.version.unwrap_or_default());

        Ok(Self { docker })
    }
}

fn status_code(err: &DockerError) -> Option<u16> {
    match err {
        DockerError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn create_container(&self, config: Config<String>) -> Result<String> {
        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .context("Failed to create container")?;

        for warning in &response.warnings {
            debug!("Docker warning for {}: {}", response.id, warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start container")
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .context("Failed to inspect container")
    }

    async fn stop_container(&self, id: &str, timeout: Option<i64>) -> Result<()> {
        let options = timeout.map(|t| StopContainerOptions { t });

        match self.docker.stop_container(id, options).await {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(e) if status_code(&e) == Some(304) => {
                debug!("Container {} was not running", id);
                Ok(())
            }
            Err(e) => Err(e).context("Failed to stop container"),
        }
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let mut stream = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e).context("Failed to wait for container"),
            None => Err(anyhow::anyhow!("Container wait stream ended unexpectedly")),
        }
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            // auto-remove got there first
            Err(e) if status_code(&e) == Some(404) => {
                debug!("Container {} already removed", id);
                Ok(())
            }
            Err(e) => Err(e).context("Failed to remove container"),
        }
    }

    async fn list_managed_containers(&self, label: &str) -> Result<Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{label}=true")]);

        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .context("Failed to list containers")?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }
}
