//! Helpers handed to automation callbacks

use ha_core::events::StateChangedData;
use ha_core::{ServiceCall, State};
use serde_json::Value;
use tracing::debug;

use crate::client::HassClient;
use crate::diff::{diff, DiffEntry};
use crate::error::{ClientError, ClientResult};

/// Thin convenience layer over a [`HassClient`]
#[derive(Clone)]
pub struct Toolkit {
    client: HassClient,
}

impl Toolkit {
    pub fn new(client: HassClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HassClient {
        &self.client
    }

    /// Call a service by `domain.object_id.service` shorthand
    ///
    /// `toolkit.call("light.kitchen.turn_on", json!({"brightness": 40}))`
    /// sends `light.turn_on` with `entity_id: "light.kitchen"` merged in.
    pub async fn call(&self, shorthand: &str, service_data: Value) -> ClientResult<()> {
        let call = ServiceCall::parse_shorthand(shorthand, service_data)
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        debug!(domain = %call.domain, service = %call.service, "Toolkit service call");
        self.client.call(call).await
    }

    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        service_data: Value,
    ) -> ClientResult<()> {
        self.client.call_service(domain, service, service_data).await
    }

    pub async fn states(&self) -> ClientResult<Vec<State>> {
        self.client.get_states().await
    }

    /// Current state of one entity, if the hub knows it
    pub async fn entity(&self, entity_id: &str) -> ClientResult<Option<State>> {
        Ok(self
            .states()
            .await?
            .into_iter()
            .find(|state| state.entity_id.to_string() == entity_id))
    }

    /// Current states of several entities, in the order asked for
    ///
    /// Unknown ids are skipped. An empty list sends nothing.
    pub async fn entities(&self, entity_ids: &[&str]) -> ClientResult<Vec<State>> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let states = self.states().await?;
        Ok(entity_ids
            .iter()
            .filter_map(|id| {
                states
                    .iter()
                    .find(|state| state.entity_id.to_string() == *id)
                    .cloned()
            })
            .collect())
    }

    /// Differences between two snapshots of an entity
    pub fn diff(&self, old: &State, new: &State) -> ClientResult<Vec<DiffEntry>> {
        Ok(diff(&serde_json::to_value(old)?, &serde_json::to_value(new)?))
    }

    /// Differences between the two sides of a `state_changed` event
    ///
    /// A missing side compares as `null`, so a first observation is a single
    /// root-level update.
    pub fn diff_event(&self, data: &StateChangedData) -> ClientResult<Vec<DiffEntry>> {
        Ok(diff(
            &serde_json::to_value(&data.old_state)?,
            &serde_json::to_value(&data.new_state)?,
        ))
    }
}
