//! Entity ID: the `domain.object_id` pair the hub uses as entity identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reasons a string is not a valid entity id
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("not a valid entity id: expected exactly one '.' between domain and object_id")]
    InvalidFormat,

    #[error("not a valid entity id: domain is empty")]
    EmptyDomain,

    #[error("not a valid entity id: object_id is empty")]
    EmptyObjectId,

    #[error("not a valid entity id: domain must be lowercase alphanumeric/underscore without leading, trailing or doubled underscores")]
    InvalidDomainChars,

    #[error("not a valid entity id: object_id must be lowercase alphanumeric/underscore without leading or trailing underscores")]
    InvalidObjectIdChars,
}

/// A validated entity id such as `light.kitchen`
///
/// Serialized as the plain dotted string, which is how every frame on the
/// wire carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    /// Build an id from its two halves, validating both
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();

        match (domain.is_empty(), object_id.is_empty()) {
            (true, _) => return Err(EntityIdError::EmptyDomain),
            (_, true) => return Err(EntityIdError::EmptyObjectId),
            _ => {}
        }
        if domain.contains("__") || !is_slug(&domain) {
            return Err(EntityIdError::InvalidDomainChars);
        }
        if !is_slug(&object_id) {
            return Err(EntityIdError::InvalidObjectIdChars);
        }

        Ok(Self { domain, object_id })
    }

    /// The part before the dot (`light`)
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The part after the dot (`kitchen`)
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Whether `s` would parse as an entity id
    pub fn is_valid(s: &str) -> bool {
        s.parse::<Self>().is_ok()
    }
}

/// Lowercase ascii letters, digits and underscores, not starting or ending with `_`
fn is_slug(s: &str) -> bool {
    !s.starts_with('_')
        && !s.ends_with('_')
        && s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, object_id) = s.split_once('.').ok_or(EntityIdError::InvalidFormat)?;
        if object_id.contains('.') {
            return Err(EntityIdError::InvalidFormat);
        }
        Self::new(domain, object_id)
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}
