use bollard::container::Config;
use bollard::models::{ContainerInspectResponse, HostConfig, PortBinding};
use std::collections::HashMap;

use super::{ContainerPort, ServiceSpec, SessionError, IMAGE_LABEL, MANAGED_LABEL};

/// Only the loopback interface gets the published port.
pub(super) const LOOPBACK: &str = "127.0.0.1";

/// Builds the create request for a session container: the spec's image with
/// `port` exposed and published on loopback under an ephemeral host port.
pub(super) fn session_container_config(spec: &ServiceSpec, port: &ContainerPort) -> Config<String> {
    let key = port.key();

    let mut exposed_ports = HashMap::new();
    exposed_ports.insert(key.clone(), HashMap::new());

    let mut port_bindings = HashMap::new();
    port_bindings.insert(
        key,
        Some(vec![PortBinding {
            host_ip: Some(LOOPBACK.to_string()),
            // daemon picks the host port
            host_port: None,
        }]),
    );

    let mut labels = HashMap::new();
    labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
    labels.insert(IMAGE_LABEL.to_string(), spec.image.clone());

    let host_config = HostConfig {
        auto_remove: Some(true),
        port_bindings: Some(port_bindings),
        shm_size: spec.shm_size,
        privileged: Some(spec.privileged),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        hostname: Some("localhost".to_string()),
        exposed_ports: Some(exposed_ports),
        labels: Some(labels),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// The published host bindings for `port`. A missing key and a `null` entry
/// both mean no bindings.
pub(super) fn host_bindings(inspect: &ContainerInspectResponse, port: &ContainerPort) -> Vec<PortBinding> {
    inspect
        .network_settings
        .as_ref()
        .and_then(|settings| settings.ports.as_ref())
        .and_then(|ports| ports.get(&port.key()))
        .and_then(|bindings| bindings.clone())
        .unwrap_or_default()
}

/// The single `(host_ip, host_port)` published for `port`.
pub(super) fn single_binding(
    inspect: &ContainerInspectResponse,
    port: &ContainerPort,
) -> Result<(String, String), SessionError> {
    let bindings = host_bindings(inspect, port);
    let [binding] = bindings.as_slice() else {
        return Err(SessionError::PortBinding {
            port: port.key(),
            found: bindings.len(),
        });
    };

    let host_port = binding
        .host_port
        .clone()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| SessionError::MalformedBinding { port: port.key() })?;

    let host_ip = match binding.host_ip.as_deref() {
        None | Some("") | Some("0.0.0.0") => LOOPBACK.to_string(),
        Some(ip) => ip.to_string(),
    };

    Ok((host_ip, host_port))
}

/// `http://<host>:<port><path>`, bracketing IPv6 hosts.
pub(super) fn session_url(host_ip: &str, host_port: &str, path: &str) -> String {
    let host = if host_ip.contains(':') {
        format!("[{host_ip}]")
    } else {
        host_ip.to_string()
    };
    format!("http://{}:{}{}", host, host_port, path)
}
