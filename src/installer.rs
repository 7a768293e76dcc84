//! Dependency-installer invocation, serialized one run at a time

use anyhow::{anyhow, Result};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Completion of one installer run, delivered to the run loop.
///
/// Carries the packages payload that triggered the run so the reconciler can
/// report it once the run is over.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub succeeded: bool,
    pub output: String,
    pub packages: Value,
}

/// Queues installer runs on a single worker task.
///
/// Overlapping requests wait for the current run to finish, so two packages
/// updates can never race each other's installer invocation.
#[derive(Clone)]
pub struct InstallRunner {
    request_tx: mpsc::Sender<Value>,
}

impl InstallRunner {
    /// Spawn the worker task. Outcomes are pushed to `outcome_tx` in request
    /// order.
    pub fn spawn(command: String, outcome_tx: mpsc::Sender<InstallOutcome>) -> Self {
        let (request_tx, mut request_rx) = mpsc::channel::<Value>(16);

        tokio::spawn(async move {
            while let Some(packages) = request_rx.recv().await {
                let outcome = run_once(&command, packages).await;
                if outcome_tx.send(outcome).await.is_err() {
                    break;
                }
            }
        });

        Self { request_tx }
    }

    /// Enqueue an installer run for the given packages payload.
    pub async fn run(&self, packages: Value) -> Result<()> {
        self.request_tx
            .send(packages)
            .await
            .map_err(|_| anyhow!("installer worker is gone"))
    }
}

async fn run_once(command: &str, packages: Value) -> InstallOutcome {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        warn!("install command is empty, skipping run");
        return InstallOutcome {
            succeeded: false,
            output: "install command is empty".into(),
            packages,
        };
    };

    info!("running installer: {}", command);
    match Command::new(program).args(parts).output().await {
        Ok(output) => {
            let succeeded = output.status.success();
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            if succeeded {
                info!("installer finished: {}", output.status);
            } else {
                warn!("installer failed: {}", output.status);
            }
            InstallOutcome {
                succeeded,
                output: text,
                packages,
            }
        }
        Err(e) => {
            warn!("failed to invoke installer {}: {}", program, e);
            InstallOutcome {
                succeeded: false,
                output: e.to_string(),
                packages,
            }
        }
    }
}
