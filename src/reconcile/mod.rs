//! Reconciliation core: maps shadow events to lifecycle and config actions

pub mod handlers;

use crate::installer::{InstallOutcome, InstallRunner};
use crate::process::ProcessSupervisor;
use crate::shadow::{
    Connectivity, PowerState, Reported, ShadowEvent, ShadowMetadata, ShadowState, ShadowWriter,
};
use crate::store::ConfigStore;
use std::process::ExitStatus;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything the field handlers act on, owned by the top-level run loop.
pub struct AgentContext {
    pub supervisor: ProcessSupervisor,
    pub store: ConfigStore,
    pub installer: InstallRunner,
    pub shadow: Arc<dyn ShadowWriter>,
}

impl AgentContext {
    /// Push a partial reported-state update. Fire-and-forget: failures are
    /// logged and never abort the caller.
    pub async fn report(&self, reported: Reported) {
        if let Err(e) = self.shadow.report(reported).await {
            warn!("failed to report state: {:#}", e);
        }
    }
}

/// Apply one shadow event.
pub async fn apply_event(ctx: &mut AgentContext, event: ShadowEvent) {
    match event {
        ShadowEvent::Status { state, meta } => {
            debug!("applying initial status snapshot");
            apply_document(ctx, state, meta).await;
        }
        ShadowEvent::Delta { state, meta } => {
            debug!("applying shadow delta");
            apply_document(ctx, state, meta).await;
        }
        ShadowEvent::Connectivity(change) => {
            apply_connectivity(ctx, change).await;
        }
    }
}

/// Run the handler for each field present in the document. Handlers are
/// independent; one field's failure never aborts its siblings.
async fn apply_document(ctx: &mut AgentContext, state: ShadowState, meta: ShadowMetadata) {
    if let Some(power) = state.power {
        let timestamp_ms = meta.power.map(|m| m.timestamp).unwrap_or(0);
        handlers::handle_power(ctx, power, timestamp_ms).await;
    }
    if let Some(flows) = state.flows {
        handlers::handle_flows(ctx, flows).await;
    }
    if let Some(creds) = state.creds {
        handlers::handle_creds(ctx, creds).await;
    }
    if let Some(packages) = state.packages {
        handlers::handle_packages(ctx, packages).await;
    }
}

/// React to a connectivity transition. Going offline while stopped starts the
/// process, keeping the device functional without connectivity; no shadow
/// interaction is attempted.
pub async fn apply_connectivity(ctx: &mut AgentContext, change: Connectivity) {
    match change {
        Connectivity::Connected => info!("connected to shadow service"),
        Connectivity::Reconnected => info!("reconnected to shadow service"),
        Connectivity::Closed => warn!("shadow connection closed"),
        Connectivity::Offline => {
            warn!("no shadow connection established");
            if !ctx.supervisor.is_running() {
                ctx.supervisor.start();
            }
        }
    }
}

/// The managed process exited on its own; reflect that in reported state.
pub async fn on_process_exit(ctx: &mut AgentContext, status: Option<ExitStatus>) {
    match status {
        Some(status) => info!("supervised process exited on its own: {}", status),
        None => warn!("supervised process exit could not be observed"),
    }
    ctx.report(Reported::power(PowerState::Off)).await;
}

/// An installer run finished; report the packages payload that triggered it.
/// The exit code does not gate the report, it is only logged.
pub async fn on_install_finished(ctx: &AgentContext, outcome: InstallOutcome) {
    if !outcome.succeeded {
        warn!(
            "dependency install failed, reporting anyway: {}",
            outcome.output.trim()
        );
    }
    ctx.report(Reported::packages(outcome.packages)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Duration};

    struct RecordingWriter {
        reports: Mutex<Vec<Reported>>,
    }

    impl RecordingWriter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                reports: Mutex::new(Vec::new()),
            })
        }

        fn reports(&self) -> Vec<Reported> {
            self.reports.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ShadowWriter for RecordingWriter {
        async fn report(&self, reported: Reported) -> anyhow::Result<()> {
            self.reports.lock().unwrap().push(reported);
            Ok(())
        }
    }

    fn context_in(
        dir: &Path,
        writer: Arc<RecordingWriter>,
    ) -> (AgentContext, mpsc::Receiver<InstallOutcome>) {
        let config = AgentConfig {
            flows_file: dir.join("flows.json"),
            creds_file: dir.join("flows_cred.json"),
            manifest_file: dir.join("package.json"),
            ..AgentConfig::default()
        };
        let (outcome_tx, outcome_rx) = mpsc::channel(4);
        let ctx = AgentContext {
            supervisor: ProcessSupervisor::new("sleep", vec!["30".into()]),
            store: ConfigStore::new(&config),
            installer: InstallRunner::spawn("true".into(), outcome_tx),
            shadow: writer,
        };
        (ctx, outcome_rx)
    }

    fn delta(state: Value, meta: Value) -> ShadowEvent {
        ShadowEvent::Delta {
            state: serde_json::from_value(state).unwrap(),
            meta: serde_json::from_value(meta).unwrap(),
        }
    }

    #[tokio::test]
    async fn stale_power_on_while_running_is_ignored() {
        let writer = RecordingWriter::new();
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, _outcomes) = context_in(dir.path(), writer.clone());

        ctx.supervisor.start();
        let last = ctx.supervisor.last_start_ms().unwrap();

        handlers::handle_power(&mut ctx, PowerState::On, last).await;

        assert!(ctx.supervisor.is_running());
        assert_eq!(ctx.supervisor.last_start_ms().unwrap(), last);
        assert!(writer.reports().is_empty());

        ctx.supervisor.stop().await;
    }

    #[tokio::test]
    async fn fresh_power_on_while_running_restarts_once() {
        let writer = RecordingWriter::new();
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, _outcomes) = context_in(dir.path(), writer.clone());

        ctx.supervisor.start();
        let last = ctx.supervisor.last_start_ms().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        handlers::handle_power(&mut ctx, PowerState::On, last + 60_000).await;

        assert!(ctx.supervisor.is_running());
        assert!(ctx.supervisor.last_start_ms().unwrap() > last);
        assert_eq!(
            writer.reports(),
            vec![
                Reported::power(PowerState::Off),
                Reported::power(PowerState::On)
            ]
        );

        ctx.supervisor.stop().await;
    }

    #[tokio::test]
    async fn off_then_fresh_on_then_stale_on_ends_running_with_one_start() {
        let writer = RecordingWriter::new();
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, _outcomes) = context_in(dir.path(), writer.clone());

        apply_event(
            &mut ctx,
            delta(json!({ "power": "off" }), json!({ "power": { "timestamp": 0 } })),
        )
        .await;
        apply_event(
            &mut ctx,
            delta(json!({ "power": "on" }), json!({ "power": { "timestamp": 1 } })),
        )
        .await;
        let started_at = ctx.supervisor.last_start_ms().unwrap();
        apply_event(
            &mut ctx,
            delta(json!({ "power": "on" }), json!({ "power": { "timestamp": 0 } })),
        )
        .await;

        assert!(ctx.supervisor.is_running());
        assert_eq!(ctx.supervisor.last_start_ms().unwrap(), started_at);
        assert_eq!(
            writer.reports(),
            vec![
                Reported::power(PowerState::Off),
                Reported::power(PowerState::On)
            ]
        );

        ctx.supervisor.stop().await;
    }

    #[tokio::test]
    async fn power_off_while_stopped_still_reports_off() {
        let writer = RecordingWriter::new();
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, _outcomes) = context_in(dir.path(), writer.clone());

        handlers::handle_power(&mut ctx, PowerState::Off, 5).await;

        assert!(!ctx.supervisor.is_running());
        assert_eq!(writer.reports(), vec![Reported::power(PowerState::Off)]);
    }

    #[tokio::test]
    async fn offline_while_stopped_starts_without_shadow_interaction() {
        let writer = RecordingWriter::new();
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, _outcomes) = context_in(dir.path(), writer.clone());

        apply_connectivity(&mut ctx, Connectivity::Offline).await;

        assert!(ctx.supervisor.is_running());
        assert!(writer.reports().is_empty());

        ctx.supervisor.stop().await;
    }

    #[tokio::test]
    async fn flows_update_persists_then_reports_the_exact_payload() {
        let writer = RecordingWriter::new();
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, _outcomes) = context_in(dir.path(), writer.clone());

        let payload = json!(r#"[{"id":"n1"}]"#);
        apply_event(
            &mut ctx,
            delta(
                json!({ "flows": r#"[{"id":"n1"}]"# }),
                json!({ "flows": { "timestamp": 7 } }),
            ),
        )
        .await;

        let written = std::fs::read_to_string(dir.path().join("flows.json")).unwrap();
        assert_eq!(written, r#"[{"id":"n1"}]"#);
        assert_eq!(writer.reports(), vec![Reported::flows(payload)]);
    }

    #[tokio::test]
    async fn packages_update_reports_only_after_the_installer_finishes() {
        let writer = RecordingWriter::new();
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, mut outcomes) = context_in(dir.path(), writer.clone());
        std::fs::write(
            dir.path().join("package.json"),
            serde_json::to_vec(&json!({
                "dependencies": { "left-pad": "^0.0.1", "chalk": "^2.0.0" }
            }))
            .unwrap(),
        )
        .unwrap();

        let payload = json!({ "left-pad": "^1.0.0" });
        apply_event(
            &mut ctx,
            delta(
                json!({ "packages": { "left-pad": "^1.0.0" } }),
                json!({ "packages": { "timestamp": 9 } }),
            ),
        )
        .await;

        // Manifest merged before the installer ran; nothing reported yet.
        let manifest: Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("package.json")).unwrap())
                .unwrap();
        assert_eq!(
            manifest["dependencies"],
            json!({ "left-pad": "^1.0.0", "chalk": "^2.0.0" })
        );
        assert!(writer.reports().is_empty());

        let outcome = timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .unwrap()
            .unwrap();
        on_install_finished(&ctx, outcome).await;

        assert_eq!(writer.reports(), vec![Reported::packages(payload)]);
    }

    #[tokio::test]
    async fn self_exit_reports_power_off() {
        let writer = RecordingWriter::new();
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, _outcomes) = context_in(dir.path(), writer.clone());

        on_process_exit(&mut ctx, None).await;

        assert_eq!(writer.reports(), vec![Reported::power(PowerState::Off)]);
    }
}
