//! Process supervisor: at most one live instance of the managed command

use super::now_ms;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{error, info};

/// Delay after a confirmed exit before a follow-up start may proceed, letting
/// exit-handling side effects in the OS/runtime settle.
const EXIT_GRACE: Duration = Duration::from_millis(10);

/// Owns the lifecycle of exactly one external process.
///
/// States are `Stopped` and `Running`; the child handle doubles as the state
/// flag. No other component spawns or kills the process.
pub struct ProcessSupervisor {
    command: String,
    args: Vec<String>,
    child: Option<Child>,
    last_start_ms: Option<u64>,
}

impl ProcessSupervisor {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            child: None,
            last_start_ms: None,
        }
    }

    /// Launch the managed command with inherited stdio and record the launch
    /// timestamp. Completion means launch issuance, not process readiness.
    ///
    /// Callers ensure no process is currently running; this does not check.
    /// Spawn errors are logged and leave the supervisor stopped, to be retried
    /// on the next triggering event.
    pub fn start(&mut self) {
        self.last_start_ms = Some(now_ms());
        match Command::new(&self.command).args(&self.args).spawn() {
            Ok(child) => {
                info!("started supervised process: {}", self.command);
                self.child = Some(child);
            }
            Err(e) => {
                error!("failed to launch {}: {}", self.command, e);
            }
        }
    }

    /// Signal the running process and wait for its exit plus the grace delay.
    /// A no-op when nothing is running.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(e) = child.start_kill() {
            error!("failed to signal supervised process: {}", e);
        }
        match child.wait().await {
            Ok(status) => info!("supervised process exited: {}", status),
            Err(e) => error!("failed to observe process exit: {}", e),
        }
        tokio::time::sleep(EXIT_GRACE).await;
    }

    /// Stop the current process (if any), then start a fresh one. The new
    /// process is never launched before the old one has fully exited and the
    /// grace delay has elapsed.
    pub async fn restart(&mut self) {
        self.stop().await;
        self.start();
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Timestamp of the most recent launch attempt, epoch milliseconds.
    pub fn last_start_ms(&self) -> Option<u64> {
        self.last_start_ms
    }

    /// Resolves when the running child exits on its own, clearing the running
    /// state. Pending forever while stopped, so it slots into a select loop.
    pub async fn wait_exit(&mut self) -> Option<ExitStatus> {
        match &mut self.child {
            Some(child) => {
                let status = child.wait().await.ok();
                self.child = None;
                status
            }
            None => std::future::pending().await,
        }
    }
}
