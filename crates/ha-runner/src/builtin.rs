//! Automations shipped with the runner

use ha_trigger::{when_any, TriggerHandler};
use tracing::info;

pub const STATE_LOGGER: &str = "builtin:state-logger";

/// Log every state transition at info level
pub fn state_logger() -> TriggerHandler {
    when_any().changes().r#do(|event| async move {
        let data = &event.data;
        let state = |s: &Option<ha_core::State>| {
            s.as_ref()
                .map(|s| s.state.clone())
                .unwrap_or_else(|| "<none>".to_string())
        };
        info!(
            entity_id = %data.entity_id,
            from = %state(&data.old_state),
            to = %state(&data.new_state),
            "State changed"
        );
        anyhow::Ok(())
    })
}
