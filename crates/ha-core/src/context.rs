//! Causal metadata attached to states and events

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Context the hub attaches to every state write and event
///
/// `id` identifies the change; `user_id` is set when a person caused it and
/// `parent_id` links changes triggered by other changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub id: String,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// A fresh context with a new ULID, used when building snapshots locally
    pub fn new() -> Self {
        Self::with_id(Ulid::new().to_string())
    }

    /// A context with a known id (as received from the hub)
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: None,
            parent_id: None,
        }
    }

    /// Whether a person (rather than an automation or device) caused the change
    pub fn is_user_initiated(&self) -> bool {
        self.user_id.is_some()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
