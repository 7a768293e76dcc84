//! Agent configuration loaded from a local JSON document

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the config document location.
pub const CONFIG_ENV: &str = "AGENT_CONFIG";

/// Default config document location when no override is set.
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

/// Errors raised while loading the agent configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Connection parameters and local file layout for one device.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Unique device/thing identifier registered with the shadow service.
    pub thing_name: String,
    /// Shadow endpoint address (host:port).
    pub shadow_host: String,
    /// Local file holding the flow definitions, overwritten wholesale on update.
    pub flows_file: PathBuf,
    /// Local file holding the flow credentials, overwritten wholesale on update.
    pub creds_file: PathBuf,
    /// Dependency manifest, merged and rewritten on each packages update.
    pub manifest_file: PathBuf,
    /// Command invoked to install merged dependencies.
    pub install_command: String,
    /// Reconnection delay (initial), milliseconds.
    pub reconnect_delay_ms: u64,
    /// Maximum reconnection delay, milliseconds.
    pub max_reconnect_delay_ms: u64,
    /// Connection timeout, milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            thing_name: "device-001".into(),
            shadow_host: "127.0.0.1:8883".into(),
            flows_file: PathBuf::from("./.node-red/flows.json"),
            creds_file: PathBuf::from("./.node-red/flows_cred.json"),
            manifest_file: PathBuf::from("./package.json"),
            install_command: "npm install".into(),
            reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl AgentConfig {
    /// Resolve the config document path from `AGENT_CONFIG`, falling back to
    /// the default local path.
    pub fn resolve_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load and parse the config document at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
