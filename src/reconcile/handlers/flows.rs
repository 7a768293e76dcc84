//! Flows field handler

use crate::reconcile::AgentContext;
use crate::shadow::Reported;
use serde_json::Value;
use tracing::{info, warn};

/// Overwrite the local flow definitions with the received payload, then report
/// it back. The payload structure is not validated.
pub async fn handle_flows(ctx: &AgentContext, flows: Value) {
    info!("received flows definition");
    if let Err(e) = ctx.store.write_flows(&flows).await {
        warn!("failed to persist flows: {}", e);
        return;
    }
    ctx.report(Reported::flows(flows)).await;
}
