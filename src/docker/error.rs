use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::Teardown;

/// Why a session could not be started.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid port spec: {0}")]
    InvalidPortSpec(String),

    #[error("Failed to create container from image '{image}': {source:#}")]
    CreationFailed {
        image: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to start container {container_id}: {source:#}")]
    StartFailed {
        container_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to inspect container {container_id}: {source:#}")]
    InspectFailed {
        container_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Expected exactly one host binding for {port}, found {found}")]
    PortBinding { port: String, found: usize },

    #[error("Host binding for {port} has no host port")]
    MalformedBinding { port: String },

    #[error("Service at {url} is not ready: {source}")]
    NotReady {
        url: String,
        #[source]
        source: ReadinessError,
    },

    #[error("Session start cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("no response from {url} within {deadline:?} after {attempts} attempts{}", last_error_suffix(.last_error))]
    Timeout {
        url: String,
        deadline: Duration,
        attempts: u32,
        last_error: Option<String>,
    },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" (last error: {e})"),
        None => String::new(),
    }
}

/// A failed start together with the teardown handle of the container it left
/// behind, if one was created. Running the teardown is the caller's call.
pub struct StartError {
    error: SessionError,
    teardown: Option<Teardown>,
}

impl StartError {
    pub(crate) fn new(error: SessionError, teardown: Option<Teardown>) -> Self {
        Self { error, teardown }
    }

    #[cfg(test)]
    pub fn error(&self) -> &SessionError {
        &self.error
    }

    #[cfg(test)]
    pub fn teardown(&self) -> Option<&Teardown> {
        self.teardown.as_ref()
    }

    pub fn into_parts(self) -> (SessionError, Option<Teardown>) {
        (self.error, self.teardown)
    }
}

impl From<SessionError> for StartError {
    fn from(error: SessionError) -> Self {
        Self::new(error, None)
    }
}

impl fmt::Debug for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartError")
            .field("error", &self.error)
            .field("container_id", &self.teardown.as_ref().map(Teardown::container_id))
            .finish()
    }
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
