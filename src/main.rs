mod cli;
mod config;
mod installer;
mod process;
mod reconcile;
mod shadow;
mod store;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command};
use config::AgentConfig;
use installer::InstallRunner;
use process::ProcessSupervisor;
use reconcile::AgentContext;
use shadow::{ShadowClient, ShadowClientConfig};
use std::sync::Arc;
use std::time::Duration;
use store::ConfigStore;
use tokio::sync::mpsc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let Command::Run { command, args } = cli.command;

    let config_path = AgentConfig::resolve_path();
    let config = AgentConfig::load(&config_path)
        .with_context(|| format!("loading agent config from {}", config_path.display()))?;

    info!("shadow agent starting: {}", config.thing_name);
    info!("  shadow endpoint: {}", config.shadow_host);
    info!("  supervising: {} {:?}", command, args);

    let mut client = ShadowClient::connect(ShadowClientConfig {
        thing_name: config.thing_name.clone(),
        host: config.shadow_host.clone(),
        reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
        max_reconnect_delay: Duration::from_millis(config.max_reconnect_delay_ms),
        connect_timeout: Duration::from_millis(config.connect_timeout_ms),
    });

    let (outcome_tx, mut outcome_rx) = mpsc::channel(16);
    let mut ctx = AgentContext {
        supervisor: ProcessSupervisor::new(command, args),
        store: ConfigStore::new(&config),
        installer: InstallRunner::spawn(config.install_command.clone(), outcome_tx),
        shadow: Arc::new(client.writer()),
    };

    // Main event loop: shadow events, installer completions, and self-exits of
    // the supervised process, one handler at a time.
    loop {
        tokio::select! {
            event = client.recv() => {
                match event {
                    Some(event) => reconcile::apply_event(&mut ctx, event).await,
                    None => {
                        error!("shadow event stream closed");
                        break;
                    }
                }
            }

            Some(outcome) = outcome_rx.recv() => {
                reconcile::on_install_finished(&ctx, outcome).await;
            }

            status = ctx.supervisor.wait_exit() => {
                reconcile::on_process_exit(&mut ctx, status).await;
            }
        }
    }

    Ok(())
}
