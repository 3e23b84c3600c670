use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::docker::{ContainerPort, ReadinessSettings, ServiceSpec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read browsers config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in browsers config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML in browsers config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Browser '{browser}': {reason}")]
    Invalid { browser: String, reason: String },
}

/// Every version of one browser, plus the one served when none is asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserVersions {
    pub default: String,
    pub versions: BTreeMap<String, ServiceSpec>,
}

/// The browser catalog: browser name to its versions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrowsersConfig {
    browsers: HashMap<String, BrowserVersions>,
}

impl BrowsersConfig {
    /// Loads and validates a catalog. `.yaml`/`.yml` files are read as YAML,
    /// anything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            Self::from_yaml(&raw)
        } else {
            Self::from_json(&raw)
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (browser, entry) in &self.browsers {
            let invalid = |reason: String| ConfigError::Invalid {
                browser: browser.clone(),
                reason,
            };

            if !entry.versions.contains_key(&entry.default) {
                return Err(invalid(format!(
                    "default version '{}' is not listed",
                    entry.default
                )));
            }

            for (version, spec) in &entry.versions {
                if spec.image.trim().is_empty() {
                    return Err(invalid(format!("version '{version}' has an empty image")));
                }
                if !spec.path.starts_with('/') {
                    return Err(invalid(format!(
                        "version '{version}' path '{}' must start with '/'",
                        spec.path
                    )));
                }
                ContainerPort::resolve(&spec.protocol, &spec.port)
                    .map_err(|e| invalid(format!("version '{version}': {e}")))?;
            }
        }
        Ok(())
    }

    /// Finds the spec for `browser`. No version means the default; otherwise
    /// an exact match wins, then the first version starting with `version`.
    pub fn find(&self, browser: &str, version: Option<&str>) -> Option<(&str, &ServiceSpec)> {
        let entry = self.browsers.get(browser)?;
        let version = match version.map(str::trim) {
            None | Some("") => entry.default.as_str(),
            Some(v) => v,
        };

        if let Some((name, spec)) = entry.versions.get_key_value(version) {
            return Some((name.as_str(), spec));
        }

        entry
            .versions
            .iter()
            .find(|(name, _)| name.starts_with(version))
            .map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.browsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.browsers.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub browsers_path: PathBuf,
    pub log_dir: String,
    pub readiness: ReadinessSettings,
    pub sweep_on_start: bool,
    pub docker_socket: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4444,
            browsers_path: PathBuf::from("browsers.json"),
            log_dir: "./logs".to_string(),
            readiness: ReadinessSettings::default(),
            sweep_on_start: true,
            docker_socket: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let parse = |key: &str| -> Result<Option<u64>> {
            lookup(key)
                .map(|v| v.trim().parse::<u64>().with_context(|| format!("{key} must be a number, got '{v}'")))
                .transpose()
        };

        let port = match lookup("BROWSERD_PORT") {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("BROWSERD_PORT must be a port number, got '{v}'"))?,
            None => defaults.port,
        };

        let sweep_on_start = match lookup("BROWSERD_SWEEP_ON_START") {
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => anyhow::bail!("BROWSERD_SWEEP_ON_START must be true or false, got '{v}'"),
            },
            None => defaults.sweep_on_start,
        };

        let readiness = ReadinessSettings {
            startup_timeout: parse("BROWSERD_STARTUP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.readiness.startup_timeout),
            poll_interval: parse("BROWSERD_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.readiness.poll_interval),
        };

        Ok(Self {
            host: lookup("BROWSERD_HOST").unwrap_or(defaults.host),
            port,
            browsers_path: lookup("BROWSERD_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.browsers_path),
            log_dir: lookup("BROWSERD_LOG_DIR").unwrap_or(defaults.log_dir),
            readiness,
            sweep_on_start,
            docker_socket: lookup("DOCKER_SOCKET").filter(|s| !s.is_empty()),
        })
    }
}
