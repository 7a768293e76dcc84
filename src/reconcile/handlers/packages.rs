//! Packages field handler

use crate::reconcile::AgentContext;
use serde_json::Value;
use tracing::{info, warn};

/// Merge the received dependency set into the manifest and enqueue an
/// installer run. The report for this field is deferred until the run
/// completes (see `on_install_finished`).
pub async fn handle_packages(ctx: &AgentContext, packages: Value) {
    info!("received packages definition");
    if let Err(e) = ctx.store.merge_packages(&packages).await {
        warn!("failed to merge dependency manifest: {}", e);
        return;
    }
    if let Err(e) = ctx.installer.run(packages).await {
        warn!("failed to enqueue installer run: {:#}", e);
    }
}
