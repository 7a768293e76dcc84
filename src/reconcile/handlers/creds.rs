//! Credentials field handler

use crate::reconcile::AgentContext;
use crate::shadow::Reported;
use serde_json::Value;
use tracing::{info, warn};

/// Overwrite the local flow credentials with the received payload, then report
/// it back.
pub async fn handle_creds(ctx: &AgentContext, creds: Value) {
    info!("received creds definition");
    if let Err(e) = ctx.store.write_creds(&creds).await {
        warn!("failed to persist creds: {}", e);
        return;
    }
    ctx.report(Reported::creds(creds)).await;
}
