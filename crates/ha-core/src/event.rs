//! Events as delivered by the hub's `event` frames

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Context;

/// Typed event payloads know which event type carries them
pub trait EventData: Clone + Send + Sync + 'static {
    fn event_type() -> &'static str;
}

/// Event type name (`state_changed`, `call_service`, custom names, or `*`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self(event_type.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The pseudo type that listens to every event
    pub fn match_all() -> Self {
        Self(crate::events::MATCH_ALL.to_string())
    }

    pub fn is_match_all(&self) -> bool {
        self.0 == crate::events::MATCH_ALL
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event fired on the hub's bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T = serde_json::Value> {
    pub event_type: EventType,

    pub data: T,

    #[serde(default)]
    pub origin: EventOrigin,

    #[serde(default = "chrono::Utc::now")]
    pub time_fired: DateTime<Utc>,

    #[serde(default)]
    pub context: Context,
}

impl<T> Event<T> {
    /// Create an event fired now with a local origin
    pub fn new(event_type: impl Into<EventType>, data: T, context: Context) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            origin: EventOrigin::Local,
            time_fired: Utc::now(),
            context,
        }
    }

    pub fn with_origin(mut self, origin: EventOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Swap the payload while keeping the envelope
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Event<U> {
        Event {
            event_type: self.event_type,
            data: f(self.data),
            origin: self.origin,
            time_fired: self.time_fired,
            context: self.context,
        }
    }
}

impl<T: EventData> Event<T> {
    /// Create an event whose type is implied by its payload
    pub fn typed(data: T, context: Context) -> Self {
        Self::new(T::event_type(), data, context)
    }
}

impl Event<serde_json::Value> {
    /// Parse the raw payload into a typed one
    ///
    /// Fails when the event type does not match or the payload does not fit `T`.
    pub fn into_typed<T>(self) -> Result<Event<T>, serde_json::Error>
    where
        T: EventData + serde::de::DeserializeOwned,
    {
        if self.event_type.as_str() != T::event_type() {
            return Err(serde::de::Error::custom(format!(
                "expected {} event, got {}",
                T::event_type(),
                self.event_type
            )));
        }
        let data = serde_json::from_value(self.data)?;
        Ok(Event {
            event_type: self.event_type,
            data,
            origin: self.origin,
            time_fired: self.time_fired,
            context: self.context,
        })
    }
}

/// Where an event originated; the hub spells these `LOCAL` and `REMOTE`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventOrigin {
    #[default]
    #[serde(alias = "local")]
    Local,
    #[serde(alias = "remote")]
    Remote,
}
