//! Power field handler: drives the supervised process up and down

use crate::reconcile::AgentContext;
use crate::shadow::{PowerState, Reported};
use tracing::debug;

/// Apply a desired power value.
///
/// A `power:on` for a process that is already running only restarts it when
/// the incoming timestamp is strictly newer than the last recorded start, so
/// replayed or out-of-order deltas never bounce a live process. Each completed
/// stop reports `off` and each issued start reports `on`; a failed spawn
/// reports nothing.
pub async fn handle_power(ctx: &mut AgentContext, power: PowerState, timestamp_ms: u64) {
    match power {
        PowerState::On => {
            if ctx.supervisor.is_running() {
                let last = ctx.supervisor.last_start_ms().unwrap_or(0);
                if timestamp_ms <= last {
                    debug!(
                        "stale power:on ignored (ts {} <= last start {})",
                        timestamp_ms, last
                    );
                    return;
                }
                ctx.supervisor.stop().await;
                ctx.report(Reported::power(PowerState::Off)).await;
            }
            ctx.supervisor.start();
            if ctx.supervisor.is_running() {
                ctx.report(Reported::power(PowerState::On)).await;
            }
        }
        PowerState::Off => {
            ctx.supervisor.stop().await;
            ctx.report(Reported::power(PowerState::Off)).await;
        }
    }
}
