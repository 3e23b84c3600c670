use std::fmt;

use super::SessionError;

const PROTOCOLS: [&str; 3] = ["tcp", "udp", "sctp"];

/// A container-internal port in the `<number>/<protocol>` form Docker uses as
/// the key of `ExposedPorts`, `PortBindings` and `NetworkSettings.Ports`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerPort {
    number: u16,
    protocol: String,
}

impl ContainerPort {
    /// Resolves `port` (`"4444"` or `"4444/tcp"`) against `protocol`. A suffix
    /// on `port` wins over `protocol`.
    pub fn resolve(protocol: &str, port: &str) -> Result<Self, SessionError> {
        let invalid = || SessionError::InvalidPortSpec(format!("{port} ({protocol})"));

        let (number, protocol) = match port.trim().split_once('/') {
            Some((number, suffix)) => (number, suffix),
            None => (port.trim(), protocol),
        };

        let number = number.trim();
        // u16::from_str takes a leading '+', Docker's port parser does not
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let number: u16 = number.parse().map_err(|_| invalid())?;
        if number == 0 {
            return Err(invalid());
        }

        let protocol = protocol.trim().to_ascii_lowercase();
        if !PROTOCOLS.contains(&protocol.as_str()) {
            return Err(invalid());
        }

        Ok(Self { number, protocol })
    }

    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ContainerPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.protocol)
    }
}
