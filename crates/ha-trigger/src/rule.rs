//! Predicates over state-changed events
//!
//! Every rule carries a blake3 fingerprint of the parameters that define it,
//! so two rules built from the same parameters compare equal and rule sets
//! can deduplicate them.

use std::fmt;
use std::sync::Arc;

use blake3::{Hash, Hasher};
use ha_core::events::StateChangedData;
use ha_core::{EntityId, State};
use serde_json::Value;

/// Which snapshot of a state change a rule reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Old,
    New,
}

impl Side {
    pub fn pick(self, data: &StateChangedData) -> Option<&State> {
        match self {
            Side::Old => data.old_state.as_ref(),
            Side::New => data.new_state.as_ref(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Side::Old => "old_state",
            Side::New => "new_state",
        }
    }
}

/// A typed accessor into an entity snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    State,
    Attribute(String),
    LastChanged,
    LastUpdated,
}

impl Field {
    pub fn attribute(name: impl Into<String>) -> Self {
        Field::Attribute(name.into())
    }

    /// Read the field from a snapshot; `None` for missing attributes
    pub fn extract(&self, state: &State) -> Option<Value> {
        match self {
            Field::State => Some(Value::String(state.state.clone())),
            Field::Attribute(name) => state.attributes.get(name).cloned(),
            Field::LastChanged => serde_json::to_value(state.last_changed).ok(),
            Field::LastUpdated => serde_json::to_value(state.last_updated).ok(),
        }
    }

    /// Read the field from one side of a change
    pub fn read(&self, side: Side, data: &StateChangedData) -> Option<Value> {
        side.pick(data).and_then(|state| self.extract(state))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::State => write!(f, "state"),
            Field::Attribute(name) => write!(f, "attributes.{}", name),
            Field::LastChanged => write!(f, "last_changed"),
            Field::LastUpdated => write!(f, "last_updated"),
        }
    }
}

/// Comparison between the old and new value of two fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
}

type Predicate = Arc<dyn Fn(&StateChangedData) -> bool + Send + Sync>;

/// What a rule checks
#[derive(Clone)]
pub enum RuleKind {
    /// Always true
    Empty,
    /// The event is about this entity
    Entity(EntityId),
    /// A field on one side equals a value
    Equals { side: Side, field: Field, value: Value },
    /// A field differs between old and new snapshot
    FieldChanged(Field),
    /// Compare a field of the old snapshot with a field of the new one
    Compare {
        old: Field,
        operator: Operator,
        new: Field,
    },
    /// User predicate, identified by name
    Custom { name: String, predicate: Predicate },
}

impl fmt::Debug for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Empty => write!(f, "Empty"),
            RuleKind::Entity(id) => write!(f, "Entity({})", id),
            RuleKind::Equals { side, field, value } => {
                write!(f, "Equals({}.{} == {})", side.as_str(), field, value)
            }
            RuleKind::FieldChanged(field) => write!(f, "FieldChanged({})", field),
            RuleKind::Compare { old, operator, new } => {
                write!(f, "Compare(old_state.{} {:?} new_state.{})", old, operator, new)
            }
            RuleKind::Custom { name, .. } => write!(f, "Custom({})", name),
        }
    }
}

/// An immutable predicate with a stable fingerprint
#[derive(Clone)]
pub struct Rule {
    kind: RuleKind,
    hash: Hash,
}

impl Rule {
    fn new(kind: RuleKind) -> Self {
        let hash = fingerprint(&kind);
        Self { kind, hash }
    }

    pub fn empty() -> Self {
        Self::new(RuleKind::Empty)
    }

    pub fn entity(entity_id: EntityId) -> Self {
        Self::new(RuleKind::Entity(entity_id))
    }

    pub fn equals(side: Side, field: Field, value: impl Into<Value>) -> Self {
        Self::new(RuleKind::Equals {
            side,
            field,
            value: value.into(),
        })
    }

    pub fn field_changed(field: Field) -> Self {
        Self::new(RuleKind::FieldChanged(field))
    }

    pub fn compare(old: Field, operator: Operator, new: Field) -> Self {
        Self::new(RuleKind::Compare { old, operator, new })
    }

    /// A user predicate; rules with the same name share a fingerprint
    pub fn custom<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&StateChangedData) -> bool + Send + Sync + 'static,
    {
        Self::new(RuleKind::Custom {
            name: name.into(),
            predicate: Arc::new(predicate),
        })
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn test(&self, data: &StateChangedData) -> bool {
        match &self.kind {
            RuleKind::Empty => true,
            RuleKind::Entity(entity_id) => &data.entity_id == entity_id,
            RuleKind::Equals { side, field, value } => {
                field.read(*side, data).as_ref() == Some(value)
            }
            RuleKind::FieldChanged(field) => {
                field.read(Side::Old, data) != field.read(Side::New, data)
            }
            RuleKind::Compare { old, operator, new } => {
                let equal = old.read(Side::Old, data) == new.read(Side::New, data);
                match operator {
                    Operator::Eq => equal,
                    Operator::Ne => !equal,
                }
            }
            RuleKind::Custom { predicate, .. } => predicate(data),
        }
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Rule {}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.hash.to_hex();
        write!(f, "{:?}#{}", self.kind, &hex.as_str()[..8])
    }
}

/// Hash the canonical text of a rule's parameters
///
/// Fields are NUL separated so adjacent parameters cannot run together.
fn fingerprint(kind: &RuleKind) -> Hash {
    let mut hasher = Hasher::new();
    let mut part = |s: &str| {
        hasher.update(s.as_bytes());
        hasher.update(&[0]);
    };

    match kind {
        RuleKind::Empty => part("empty"),
        RuleKind::Entity(entity_id) => {
            part("entity");
            part(&entity_id.to_string());
        }
        RuleKind::Equals { side, field, value } => {
            part("equals");
            part(side.as_str());
            part(&field.to_string());
            part(&value.to_string());
        }
        RuleKind::FieldChanged(field) => {
            part("field_changed");
            part(&field.to_string());
        }
        RuleKind::Compare { old, operator, new } => {
            part("compare");
            part(&old.to_string());
            part(match operator {
                Operator::Eq => "==",
                Operator::Ne => "!=",
            });
            part(&new.to_string());
        }
        RuleKind::Custom { name, .. } => {
            part("custom");
            part(name);
        }
    }

    hasher.finalize()
}
