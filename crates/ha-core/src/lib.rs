//! Core types for talking to a Home Assistant hub
//!
//! This crate provides the snapshot types the client receives over the
//! websocket API: EntityId, State, Event, Context, and ServiceCall. The client
//! never owns entities; everything here is a copy of what the hub reported.

mod context;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::{Event, EventData, EventOrigin, EventType};
pub use service_call::{ServiceCall, ServiceCallError};
pub use state::State;

/// Standard event types used by Home Assistant
pub mod events {
    use super::*;

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Event type for service calls
    pub const CALL_SERVICE: &str = "call_service";

    /// Pseudo event type for listeners that want every event
    pub const MATCH_ALL: &str = "*";

    /// Data for STATE_CHANGED events
    ///
    /// `old_state` is `None` the first time the hub reports an entity and
    /// `new_state` is `None` when the entity has been removed.
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        #[serde(default)]
        pub old_state: Option<State>,
        #[serde(default)]
        pub new_state: Option<State>,
    }

    impl StateChangedData {
        /// Build change data from two snapshots of the same entity
        pub fn new(entity_id: EntityId, old_state: Option<State>, new_state: Option<State>) -> Self {
            Self {
                entity_id,
                old_state,
                new_state,
            }
        }

        /// True when this is the first observation of the entity
        pub fn is_first_observation(&self) -> bool {
            self.old_state.is_none() && self.new_state.is_some()
        }

        /// True when the entity was removed from the hub
        pub fn is_removal(&self) -> bool {
            self.new_state.is_none()
        }

        /// Check that both snapshots (when present) belong to `entity_id`
        pub fn is_consistent(&self) -> bool {
            [&self.old_state, &self.new_state]
                .into_iter()
                .flatten()
                .all(|s| s.entity_id == self.entity_id)
        }
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }

    /// Data for CALL_SERVICE events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct CallServiceData {
        pub domain: String,
        pub service: String,
        #[serde(default)]
        pub service_data: serde_json::Value,
    }

    impl EventData for CallServiceData {
        fn event_type() -> &'static str {
            CALL_SERVICE
        }
    }
}
