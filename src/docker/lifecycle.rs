use anyhow::Result;
use reqwest::Url;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::container::{session_container_config, session_url, single_binding};
use super::{
    ContainerEvent, ContainerPort, ContainerRuntime, LifecycleEvents, ReadinessWaiter,
    ServiceSpec, SessionError, StartError, MANAGED_LABEL,
};

/// Creates, starts and readies one container per session. Holds no per-session
/// state: each container belongs to the `Teardown` handed out for it.
#[derive(Clone)]
pub struct ContainerLifecycleManager {
    runtime: Arc<dyn ContainerRuntime>,
    readiness: Arc<dyn ReadinessWaiter>,
    events: Arc<dyn LifecycleEvents>,
    startup_timeout: Duration,
}

impl ContainerLifecycleManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        readiness: Arc<dyn ReadinessWaiter>,
        events: Arc<dyn LifecycleEvents>,
        startup_timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            readiness,
            events,
            startup_timeout,
        }
    }

    /// Runs `spec` in a fresh container and waits until its health path
    /// answers.
    ///
    /// Any failure after the container was created carries its `Teardown` in
    /// the returned `StartError`; nothing is cleaned up here.
    pub async fn start_session(
        &self,
        spec: &ServiceSpec,
        cancel: &CancellationToken,
    ) -> Result<Session, StartError> {
        let port = ContainerPort::resolve(&spec.protocol, &spec.port)?;

        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled.into());
        }

        let config = session_container_config(spec, &port);
        let container_id = self
            .runtime
            .create_container(config)
            .await
            .map_err(|source| SessionError::CreationFailed {
                image: spec.image.clone(),
                source,
            })?;

        self.events.emit(ContainerEvent::Created {
            container_id: container_id.clone(),
            image: spec.image.clone(),
        });
        let teardown = Teardown::new(self.runtime.clone(), self.events.clone(), container_id.clone());

        if cancel.is_cancelled() {
            return Err(StartError::new(SessionError::Cancelled, Some(teardown)));
        }

        if let Err(source) = self.runtime.start_container(&container_id).await {
            let error = SessionError::StartFailed { container_id, source };
            return Err(StartError::new(error, Some(teardown)));
        }
        self.events.emit(ContainerEvent::Started {
            container_id: container_id.clone(),
        });

        if cancel.is_cancelled() {
            return Err(StartError::new(SessionError::Cancelled, Some(teardown)));
        }

        let inspect = match self.runtime.inspect_container(&container_id).await {
            Ok(inspect) => inspect,
            Err(source) => {
                let error = SessionError::InspectFailed { container_id, source };
                return Err(StartError::new(error, Some(teardown)));
            }
        };

        let (host_ip, host_port) = match single_binding(&inspect, &port) {
            Ok(binding) => binding,
            Err(error) => return Err(StartError::new(error, Some(teardown))),
        };
        self.events.emit(ContainerEvent::BindingResolved {
            container_id: container_id.clone(),
            port: port.key(),
            host_ip: host_ip.clone(),
            host_port: host_port.clone(),
        });

        let candidate = session_url(&host_ip, &host_port, &spec.path);
        let url = match Url::parse(&candidate) {
            Ok(url) => url,
            Err(_) => {
                let error = SessionError::MalformedBinding { port: port.key() };
                return Err(StartError::new(error, Some(teardown)));
            }
        };

        let started = Instant::now();
        let ready = tokio::select! {
            ready = self.readiness.wait_ready(&url, self.startup_timeout) => ready,
            _ = cancel.cancelled() => {
                return Err(StartError::new(SessionError::Cancelled, Some(teardown)));
            }
        };
        if let Err(source) = ready {
            let error = SessionError::NotReady {
                url: url.to_string(),
                source,
            };
            return Err(StartError::new(error, Some(teardown)));
        }

        self.events.emit(ContainerEvent::Ready {
            container_id,
            url: url.to_string(),
            elapsed: started.elapsed(),
        });

        Ok(Session { url, teardown })
    }

    /// Force-removes containers left behind by an earlier run. Returns how
    /// many were removed.
    pub async fn sweep_orphans(&self) -> Result<usize> {
        let orphans = self.runtime.list_managed_containers(MANAGED_LABEL).await?;
        let mut removed = 0;

        for id in orphans {
            match self.runtime.remove_container(&id, true).await {
                Ok(()) => {
                    self.events.emit(ContainerEvent::OrphanRemoved { container_id: id });
                    removed += 1;
                }
                Err(e) => self.events.emit(ContainerEvent::OrphanRemoveFailed {
                    container_id: id,
                    reason: format!("{e:#}"),
                }),
            }
        }

        Ok(removed)
    }
}

/// A ready session: where to send traffic, and how to get rid of it.
pub struct Session {
    url: Url,
    teardown: Teardown,
}

impl Session {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn container_id(&self) -> &str {
        self.teardown.container_id()
    }

    pub fn into_teardown(self) -> Teardown {
        self.teardown
    }

    pub async fn close(self) {
        self.teardown.run().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.url.as_str())
            .field("container_id", &self.container_id())
            .finish()
    }
}

/// One-shot release of a session container. `run` consumes the handle.
pub struct Teardown {
    runtime: Arc<dyn ContainerRuntime>,
    events: Arc<dyn LifecycleEvents>,
    container_id: String,
}

impl Teardown {
    pub(crate) fn new(
        runtime: Arc<dyn ContainerRuntime>,
        events: Arc<dyn LifecycleEvents>,
        container_id: String,
    ) -> Self {
        Self {
            runtime,
            events,
            container_id,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Stops, then force-removes the container. A failed stop does not skip
    /// the removal, and a failed removal is retried once. Failures are only
    /// reported as events.
    pub async fn run(self) {
        let id = self.container_id.as_str();

        match self.runtime.stop_container(id, None).await {
            Ok(()) => {
                let exit_code = self.runtime.wait_container(id).await.ok();
                self.events.emit(ContainerEvent::Stopped {
                    container_id: id.to_string(),
                    exit_code,
                });
            }
            Err(e) => self.events.emit(ContainerEvent::StopFailed {
                container_id: id.to_string(),
                reason: format!("{e:#}"),
            }),
        }

        for attempt in 1..=2 {
            match self.runtime.remove_container(id, true).await {
                Ok(()) => {
                    self.events.emit(ContainerEvent::Removed {
                        container_id: id.to_string(),
                    });
                    return;
                }
                Err(e) => self.events.emit(ContainerEvent::RemoveFailed {
                    container_id: id.to_string(),
                    attempt,
                    reason: format!("{e:#}"),
                }),
            }
        }
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown")
            .field("container_id", &self.container_id)
            .finish()
    }
}
