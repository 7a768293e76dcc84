//! Local persistence for flow definitions, credentials, and the dependency manifest

use crate::config::AgentConfig;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the local config store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("packages payload is not a dependency set")]
    InvalidPackages,
}

/// File-backed store for the device's flow configuration.
///
/// Flows and credentials are overwritten wholesale on each update; the
/// dependency manifest is merged last-write-wins by package name.
pub struct ConfigStore {
    flows_file: PathBuf,
    creds_file: PathBuf,
    manifest_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            flows_file: config.flows_file.clone(),
            creds_file: config.creds_file.clone(),
            manifest_file: config.manifest_file.clone(),
        }
    }

    /// Overwrite the local flow definitions with the received payload.
    pub async fn write_flows(&self, payload: &Value) -> Result<(), StoreError> {
        write_payload(&self.flows_file, payload).await
    }

    /// Overwrite the local flow credentials with the received payload.
    pub async fn write_creds(&self, payload: &Value) -> Result<(), StoreError> {
        write_payload(&self.creds_file, payload).await
    }

    /// Merge the received dependency set into the manifest and persist it.
    ///
    /// A missing manifest is treated as empty. Entries in the payload override
    /// existing entries by name; untouched entries survive.
    pub async fn merge_packages(&self, payload: &Value) -> Result<(), StoreError> {
        let deps = parse_dependency_set(payload)?;

        let manifest = match tokio::fs::read(&self.manifest_file).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
                    path: self.manifest_file.clone(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Object(Map::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.manifest_file.clone(),
                    source,
                });
            }
        };

        let merged = merge_manifest(manifest, deps);
        let bytes = serde_json::to_vec_pretty(&merged).map_err(|source| StoreError::Encode {
            path: self.manifest_file.clone(),
            source,
        })?;
        write_bytes(&self.manifest_file, &bytes).await
    }
}

/// String payloads are written verbatim so the file round-trips the exact
/// content received; anything else is written as pretty JSON.
async fn write_payload(path: &Path, payload: &Value) -> Result<(), StoreError> {
    let bytes = match payload {
        Value::String(raw) => raw.clone().into_bytes(),
        other => serde_json::to_vec_pretty(other).map_err(|source| StoreError::Encode {
            path: path.to_path_buf(),
            source,
        })?,
    };
    write_bytes(path, &bytes).await
}

async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// Accepts either a JSON object or a JSON-encoded string of one.
fn parse_dependency_set(payload: &Value) -> Result<Map<String, Value>, StoreError> {
    let value = match payload {
        Value::String(raw) => {
            serde_json::from_str(raw).map_err(|_| StoreError::InvalidPackages)?
        }
        other => other.clone(),
    };
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::InvalidPackages),
    }
}

/// Last-write-wins merge of a dependency set into the manifest's
/// `dependencies` table. Other manifest fields are preserved.
fn merge_manifest(manifest: Value, deps: Map<String, Value>) -> Value {
    let mut root = match manifest {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let mut dependencies = match root.remove("dependencies") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (name, version) in deps {
        dependencies.insert(name, version);
    }
    root.insert("dependencies".into(), Value::Object(dependencies));
    Value::Object(root)
}
