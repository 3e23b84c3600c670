//! Recording doubles for the runtime, readiness and event seams.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bollard::container::Config;
use bollard::models::{ContainerInspectResponse, NetworkSettings, PortBinding};
use reqwest::Url;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ContainerEvent, ContainerRuntime, LifecycleEvents, ReadinessError, ReadinessWaiter};

/// An inspect response whose `NetworkSettings.Ports` maps `port` to
/// `bindings` (`None` renders as a `null` entry).
pub(crate) fn inspect_with_bindings(
    port: &str,
    bindings: Option<Vec<(&str, &str)>>,
) -> ContainerInspectResponse {
    let bindings = bindings.map(|list| {
        list.into_iter()
            .map(|(ip, host_port)| PortBinding {
                host_ip: Some(ip.to_string()),
                host_port: Some(host_port.to_string()),
            })
            .collect()
    });

    let mut ports = HashMap::new();
    ports.insert(port.to_string(), bindings);

    ContainerInspectResponse {
        network_settings: Some(NetworkSettings {
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RuntimeCall {
    Create,
    Start,
    Inspect,
    Stop,
    Wait,
    Remove,
    List,
}

#[derive(Default)]
struct FakeRuntimeInner {
    inspect: ContainerInspectResponse,
    calls: Vec<RuntimeCall>,
    created: Vec<Config<String>>,
    removed: Vec<String>,
    managed: Vec<String>,
    listed_labels: Vec<String>,
    create_error: Option<String>,
    start_error: Option<String>,
    stop_error: Option<String>,
    remove_failures: usize,
}

#[derive(Clone, Default)]
pub(crate) struct FakeRuntime {
    inner: Arc<Mutex<FakeRuntimeInner>>,
}

impl FakeRuntime {
    pub(crate) const CONTAINER_ID: &'static str = "c0ffee";

    pub(crate) fn new(inspect: ContainerInspectResponse) -> Self {
        let runtime = Self::default();
        runtime.inner.lock().unwrap().inspect = inspect;
        runtime
    }

    pub(crate) fn with_bindings(bindings: Vec<(&str, &str)>) -> Self {
        Self::new(inspect_with_bindings("4444/tcp", Some(bindings)))
    }

    pub(crate) fn fail_create(&self, message: &str) {
        self.inner.lock().unwrap().create_error = Some(message.to_string());
    }

    pub(crate) fn fail_start(&self, message: &str) {
        self.inner.lock().unwrap().start_error = Some(message.to_string());
    }

    pub(crate) fn fail_stop(&self, message: &str) {
        self.inner.lock().unwrap().stop_error = Some(message.to_string());
    }

    pub(crate) fn fail_remove_times(&self, times: usize) {
        self.inner.lock().unwrap().remove_failures = times;
    }

    pub(crate) fn set_managed(&self, ids: Vec<&str>) {
        self.inner.lock().unwrap().managed = ids.into_iter().map(String::from).collect();
    }

    pub(crate) fn calls(&self) -> Vec<RuntimeCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub(crate) fn created_configs(&self) -> Vec<Config<String>> {
        self.inner.lock().unwrap().created.clone()
    }

    pub(crate) fn removed(&self) -> Vec<String> {
        self.inner.lock().unwrap().removed.clone()
    }

    pub(crate) fn listed_labels(&self) -> Vec<String> {
        self.inner.lock().unwrap().listed_labels.clone()
    }

    fn record(&self, call: RuntimeCall) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_container(&self, config: Config<String>) -> Result<String> {
        self.record(RuntimeCall::Create);
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = &inner.create_error {
            return Err(anyhow!("{message}").context("Failed to create container"));
        }
        inner.created.push(config);
        Ok(Self::CONTAINER_ID.to_string())
    }

    async fn start_container(&self, _id: &str) -> Result<()> {
        self.record(RuntimeCall::Start);
        match &self.inner.lock().unwrap().start_error {
            Some(message) => Err(anyhow!("{message}").context("Failed to start container")),
            None => Ok(()),
        }
    }

    async fn inspect_container(&self, _id: &str) -> Result<ContainerInspectResponse> {
        self.record(RuntimeCall::Inspect);
        Ok(self.inner.lock().unwrap().inspect.clone())
    }

    async fn stop_container(&self, _id: &str, _timeout: Option<i64>) -> Result<()> {
        self.record(RuntimeCall::Stop);
        match &self.inner.lock().unwrap().stop_error {
            Some(message) => Err(anyhow!("{message}").context("Failed to stop container")),
            None => Ok(()),
        }
    }

    async fn wait_container(&self, _id: &str) -> Result<i64> {
        self.record(RuntimeCall::Wait);
        Ok(0)
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<()> {
        self.record(RuntimeCall::Remove);
        let mut inner = self.inner.lock().unwrap();
        if inner.remove_failures > 0 {
            inner.remove_failures -= 1;
            return Err(anyhow!("removal of container {id} is already in progress"));
        }
        inner.removed.push(id.to_string());
        Ok(())
    }

    async fn list_managed_containers(&self, label: &str) -> Result<Vec<String>> {
        self.record(RuntimeCall::List);
        let mut inner = self.inner.lock().unwrap();
        inner.listed_labels.push(label.to_string());
        Ok(inner.managed.clone())
    }
}

#[derive(Debug, Clone, Copy)]
enum ReadinessMode {
    Ready,
    Never,
    Hanging,
}

/// Readiness double that records every URL it is asked about.
#[derive(Clone)]
pub(crate) struct CountingReadiness {
    mode: ReadinessMode,
    urls: Arc<Mutex<Vec<String>>>,
}

impl CountingReadiness {
    fn with_mode(mode: ReadinessMode) -> Self {
        Self {
            mode,
            urls: Arc::default(),
        }
    }

    pub(crate) fn ready() -> Self {
        Self::with_mode(ReadinessMode::Ready)
    }

    /// Reports a timeout straight away.
    pub(crate) fn never() -> Self {
        Self::with_mode(ReadinessMode::Never)
    }

    /// Never returns.
    pub(crate) fn hanging() -> Self {
        Self::with_mode(ReadinessMode::Hanging)
    }

    pub(crate) fn count(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadinessWaiter for CountingReadiness {
    async fn wait_ready(&self, url: &Url, deadline: Duration) -> Result<(), ReadinessError> {
        self.urls.lock().unwrap().push(url.to_string());
        match self.mode {
            ReadinessMode::Ready => Ok(()),
            ReadinessMode::Never => Err(ReadinessError::Timeout {
                url: url.to_string(),
                deadline,
                attempts: 1,
                last_error: Some("connection refused".to_string()),
            }),
            ReadinessMode::Hanging => std::future::pending().await,
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingEvents {
    events: Arc<Mutex<Vec<ContainerEvent>>>,
}

impl RecordingEvents {
    pub(crate) fn events(&self) -> Vec<ContainerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn kinds(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .map(|event| match event {
                ContainerEvent::Created { .. } => "created",
                ContainerEvent::Started { .. } => "started",
                ContainerEvent::BindingResolved { .. } => "binding_resolved",
                ContainerEvent::Ready { .. } => "ready",
                ContainerEvent::StopFailed { .. } => "stop_failed",
                ContainerEvent::Stopped { .. } => "stopped",
                ContainerEvent::RemoveFailed { .. } => "remove_failed",
                ContainerEvent::Removed { .. } => "removed",
                ContainerEvent::OrphanRemoved { .. } => "orphan_removed",
                ContainerEvent::OrphanRemoveFailed { .. } => "orphan_remove_failed",
            })
            .collect()
    }
}

impl LifecycleEvents for RecordingEvents {
    fn emit(&self, event: ContainerEvent) {
        self.events.lock().unwrap().push(event);
    }
}
