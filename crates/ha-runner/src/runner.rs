//! Feeds `state_changed` events from the hub into registered automations

use ha_client::{ClientResult, HassClient};
use tracing::{debug, info, warn};

use crate::registry::AutomationRegistry;

/// Totals for one [`Runner::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events: usize,
    pub failures: usize,
}

pub struct Runner;

impl Runner {
    /// Dispatch state changes until the event stream ends
    ///
    /// The stream ends when the connection closes. Handler failures are
    /// counted and logged; they never stop the loop.
    pub async fn run(client: &HassClient, registry: &AutomationRegistry) -> ClientResult<RunSummary> {
        let mut changes = client.on_state_changed().await?;
        info!(automations = registry.len(), "Listening for state changes");

        let mut summary = RunSummary::default();
        while let Some(event) = changes.recv().await {
            debug!(entity_id = %event.data.entity_id, "State changed");
            let report = registry.handlers().dispatch(&event).await;
            summary.events += 1;
            summary.failures += report.failed.len();
        }

        if client.is_connected() {
            warn!("State change stream ended while still connected");
        } else {
            info!(events = summary.events, failures = summary.failures, "Connection closed");
        }
        Ok(summary)
    }
}
