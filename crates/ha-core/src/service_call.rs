//! Service call addressing: `domain.service` plus data

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EntityId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceCallError {
    #[error("service call '{0}' must look like 'domain.object_id.service'")]
    InvalidShorthand(String),
}

/// A request to run a service on the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    /// e.g. "light"
    pub domain: String,

    /// e.g. "turn_on"
    pub service: String,

    #[serde(default)]
    pub service_data: serde_json::Value,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
        }
    }

    /// Parse the `light.kitchen.turn_on` shorthand
    ///
    /// The entity id (`light.kitchen`) is merged into `service_data` under
    /// `entity_id`; keys already present in `service_data` win.
    pub fn parse_shorthand(
        shorthand: &str,
        service_data: serde_json::Value,
    ) -> Result<Self, ServiceCallError> {
        let invalid = || ServiceCallError::InvalidShorthand(shorthand.to_string());

        let (entity, service) = shorthand.rsplit_once('.').ok_or_else(invalid)?;
        let entity_id: EntityId = entity.parse().map_err(|_| invalid())?;
        if service.is_empty() {
            return Err(invalid());
        }

        let mut data = serde_json::Map::new();
        data.insert(
            "entity_id".to_string(),
            serde_json::Value::String(entity_id.to_string()),
        );
        if let serde_json::Value::Object(extra) = service_data {
            data.extend(extra);
        }

        Ok(Self::new(
            entity_id.domain(),
            service,
            serde_json::Value::Object(data),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_shorthand() {
        let call =
            ServiceCall::parse_shorthand("light.kitchen.turn_on", json!({"brightness": 120}))
                .unwrap();
        assert_eq!(call.domain, "light");
        assert_eq!(call.service, "turn_on");
        assert_eq!(
            call.service_data,
            json!({"entity_id": "light.kitchen", "brightness": 120})
        );
    }

    #[test]
    fn test_shorthand_data_wins() {
        let call = ServiceCall::parse_shorthand(
            "light.kitchen.turn_off",
            json!({"entity_id": ["light.kitchen", "light.hall"]}),
        )
        .unwrap();
        assert_eq!(
            call.service_data["entity_id"],
            json!(["light.kitchen", "light.hall"])
        );
    }

    #[test]
    fn test_invalid_shorthand() {
        assert!(ServiceCall::parse_shorthand("turn_on", json!({})).is_err());
        assert!(ServiceCall::parse_shorthand("light.turn_on", json!({})).is_err());
        assert!(ServiceCall::parse_shorthand("light.kitchen.", json!(null)).is_err());
    }
}
