use crate::service::{agent_register_url, RuntimeProfile, BIND_HOST, HTTP_PORT};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the base directory.
pub const CONFIG_FILE_NAME: &str = "launcher.toml";

/// Top-level configuration loaded from launcher.toml.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
#[derive(Default)]
pub struct LauncherConfig {
    pub java: JavaConfig,
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
#[derive(Default)]
pub struct JavaConfig {
    /// Runtime home; defaults to the bundled `packages/jre`.
    pub home: Option<PathBuf>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub heap: String,
    pub bind_host: String,
    pub http_port: u16,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub enabled: bool,
    pub heap: String,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Seconds stop waits for an interrupted child before killing its group.
    pub grace_period_secs: u64,
}

/// Errors loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl LauncherConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Web UI URL announced at startup.
    pub fn web_url(&self) -> String {
        crate::service::web_url(&self.server.bind_host, self.server.http_port)
    }

    pub fn runtime_profile(&self) -> RuntimeProfile {
        RuntimeProfile {
            server_heap: self.server.heap.clone(),
            agent_heap: self.agent.heap.clone(),
            server_url: agent_register_url(&self.server.bind_host, self.server.http_port),
        }
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown.grace_period_secs)
    }
}

// --- Default implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            heap: "1024m".to_string(),
            bind_host: BIND_HOST.to_string(),
            http_port: HTTP_PORT,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heap: "256m".to_string(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
        }
    }
}
