mod client;
mod container;
mod error;
mod lifecycle;
mod port;
mod readiness;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ContainerRuntime, DockerClient, DockerConfig};
pub use error::{ReadinessError, SessionError, StartError};
pub use lifecycle::{ContainerLifecycleManager, Session, Teardown};
pub use port::ContainerPort;
pub use readiness::{HttpReadinessWaiter, ReadinessWaiter};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Label stamped on every container this service creates.
pub const MANAGED_LABEL: &str = "browserd.managed";
pub const IMAGE_LABEL: &str = "browserd.image";

/// What to run for one browser version: image, internal port, health path
/// and the pass-through runtime constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    pub image: String,
    pub port: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shm_size: Option<i64>,
    #[serde(default)]
    pub privileged: bool,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

impl ServiceSpec {
    #[cfg(test)]
    pub fn new(image: impl Into<String>, port: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            port: port.into(),
            protocol: default_protocol(),
            path: path.into(),
            shm_size: None,
            privileged: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadinessSettings {
    /// How long a started container gets to answer its health path.
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    Created { container_id: String, image: String },
    Started { container_id: String },
    BindingResolved { container_id: String, port: String, host_ip: String, host_port: String },
    Ready { container_id: String, url: String, elapsed: Duration },
    StopFailed { container_id: String, reason: String },
    Stopped { container_id: String, exit_code: Option<i64> },
    RemoveFailed { container_id: String, attempt: u32, reason: String },
    Removed { container_id: String },
    /// A managed container left over from an earlier run was removed.
    OrphanRemoved { container_id: String },
    OrphanRemoveFailed { container_id: String, reason: String },
}

/// Sink for lifecycle events, injected into the lifecycle manager.
pub trait LifecycleEvents: Send + Sync {
    fn emit(&self, event: ContainerEvent);
}

/// Renders lifecycle events as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl LifecycleEvents for TracingEvents {
    fn emit(&self, event: ContainerEvent) {
        match event {
            ContainerEvent::Created { container_id, image } => {
                info!(container_id = %container_id, image = %image, "Container created");
            }
            ContainerEvent::Started { container_id } => {
                info!(container_id = %container_id, "Container started");
            }
            ContainerEvent::BindingResolved { container_id, port, host_ip, host_port } => {
                debug!(
                    container_id = %container_id,
                    port = %port,
                    host_ip = %host_ip,
                    host_port = %host_port,
                    "Port binding resolved"
                );
            }
            ContainerEvent::Ready { container_id, url, elapsed } => {
                info!(
                    container_id = %container_id,
                    url = %url,
                    elapsed_ms = %elapsed.as_millis(),
                    "Container ready"
                );
            }
            ContainerEvent::StopFailed { container_id, reason } => {
                warn!(container_id = %container_id, "Unable to stop container: {}", reason);
            }
            ContainerEvent::Stopped { container_id, exit_code } => {
                info!(container_id = %container_id, exit_code = ?exit_code, "Container stopped");
            }
            ContainerEvent::RemoveFailed { container_id, attempt, reason } => {
                warn!(
                    container_id = %container_id,
                    attempt = attempt,
                    "Unable to remove container: {}",
                    reason
                );
            }
            ContainerEvent::Removed { container_id } => {
                info!(container_id = %container_id, "Container removed");
            }
            ContainerEvent::OrphanRemoved { container_id } => {
                info!(container_id = %container_id, "Removed orphaned container");
            }
            ContainerEvent::OrphanRemoveFailed { container_id, reason } => {
                warn!(container_id = %container_id, "Unable to remove orphaned container: {}", reason);
            }
        }
    }
}
