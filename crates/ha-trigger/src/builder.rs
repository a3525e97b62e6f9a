//! Fluent trigger builder
//!
//! ```ignore
//! when("light.kitchen")?
//!     .from("on")
//!     .to("off")
//!     .r#for(5, TimeUnit::Seconds)
//!     .r#do(|event| async move { ... })
//! ```
//!
//! Each chain call moves the builder to a new stage type; a call that makes
//! no sense at the current stage does not exist on that type.

use std::future::Future;
use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;

use ha_core::events::StateChangedData;
use ha_core::{EntityId, Event};
use serde_json::Value;
use tracing::debug;

use crate::error::{TriggerError, TriggerResult};
use crate::handler::{callback, RuleSet, TriggerHandler};
use crate::rule::{Field, Rule, Side};

/// Builder stages
pub mod stage {
    /// Fresh from `when`/`when_any`
    #[derive(Debug)]
    pub struct Start;
    /// After `changes`
    #[derive(Debug)]
    pub struct Changed;
    /// After `from`
    #[derive(Debug)]
    pub struct From;
    /// After `to` (or `turns`)
    #[derive(Debug)]
    pub struct To;
    /// After both `from` and `to`
    #[derive(Debug)]
    pub struct FromTo;
    /// After `for`
    #[derive(Debug)]
    pub struct Timed;
    /// After `when_custom`; only `do` remains
    #[derive(Debug)]
    pub struct Custom;

    /// Stages that accept `from`
    pub trait AcceptsFrom {
        type Next;
    }

    /// Stages that accept `to`
    pub trait AcceptsTo {
        type Next;
    }

    /// Stages that accept `for`
    pub trait AcceptsFor {}

    impl AcceptsFrom for Start {
        type Next = From;
    }
    impl AcceptsFrom for Changed {
        type Next = From;
    }
    impl AcceptsFrom for To {
        type Next = FromTo;
    }

    impl AcceptsTo for Start {
        type Next = To;
    }
    impl AcceptsTo for Changed {
        type Next = To;
    }
    impl AcceptsTo for From {
        type Next = FromTo;
    }

    impl AcceptsFor for Start {}
    impl AcceptsFor for Changed {}
    impl AcceptsFor for From {}
    impl AcceptsFor for To {}
    impl AcceptsFor for FromTo {}
    impl AcceptsFor for Timed {}
}

use stage::{AcceptsFor, AcceptsFrom, AcceptsTo};

/// Unit for [`Builder::r#for`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    pub fn duration(self, value: u64) -> Duration {
        let factor = match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
        };
        Duration::from_millis(value.saturating_mul(factor))
    }
}

impl FromStr for TimeUnit {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ms" | "millisecond" | "milliseconds" => Ok(TimeUnit::Milliseconds),
            "s" | "second" | "seconds" => Ok(TimeUnit::Seconds),
            "m" | "minute" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "hour" | "hours" => Ok(TimeUnit::Hours),
            other => Err(TriggerError::Validation(format!(
                "unknown time unit: {}",
                other
            ))),
        }
    }
}

/// Trigger under construction
#[derive(Debug)]
pub struct Builder<S> {
    rules: RuleSet,
    timeout: Duration,
    stage: PhantomData<S>,
}

/// React to every state change
pub fn when_any() -> Builder<stage::Start> {
    Builder::new(RuleSet::new().with_call(Rule::empty()))
}

/// React to state changes of one entity
///
/// Fails with [`TriggerError::Validation`] if `entity_id` is not of the form
/// `domain.object_id`.
pub fn when(entity_id: &str) -> TriggerResult<Builder<stage::Start>> {
    let entity_id: EntityId = entity_id
        .parse()
        .map_err(|_| TriggerError::Validation(format!("not a valid entity id: {}", entity_id)))?;

    let rule = Rule::entity(entity_id);
    Ok(Builder::new(
        RuleSet::new().with_call(rule.clone()).with_scope(rule),
    ))
}

/// React whenever `predicate` holds; the predicate owns all the logic
pub fn when_custom<F>(predicate: F) -> Builder<stage::Custom>
where
    F: Fn(&StateChangedData) -> bool + Send + Sync + 'static,
{
    let name = std::any::type_name::<F>();
    Builder::new(RuleSet::new().with_call(Rule::custom(name, predicate)))
}

impl<S> Builder<S> {
    fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            timeout: Duration::ZERO,
            stage: PhantomData,
        }
    }

    fn advance<T>(self) -> Builder<T> {
        Builder {
            rules: self.rules,
            timeout: self.timeout,
            stage: PhantomData,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Seal the builder around `callback`
    pub fn r#do<F, Fut>(self, f: F) -> TriggerHandler
    where
        F: Fn(Event<StateChangedData>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        debug!(
            call_rules = self.rules.call_rules().count(),
            cancel_rules = self.rules.cancel_rules().count(),
            timeout_ms = self.timeout.as_millis() as u64,
            "Sealed trigger"
        );
        TriggerHandler::from_rules(self.rules, self.timeout, callback(f))
    }
}

impl Builder<stage::Start> {
    /// Any change; adds no rule
    pub fn changes(self) -> Builder<stage::Changed> {
        self.advance()
    }

    /// A change of `field` between the old and new snapshot
    pub fn changes_of(mut self, field: Field) -> Builder<stage::Changed> {
        self.rules.add_call(Rule::field_changed(field));
        self.advance()
    }

    /// `changes_of(Field::State).to(state)`
    pub fn turns(self, state: impl Into<Value>) -> Builder<stage::To> {
        self.changes_of(Field::State).to(state)
    }

    pub fn becomes(self, state: impl Into<Value>) -> Builder<stage::To> {
        self.turns(state)
    }

    pub fn switches(self, state: impl Into<Value>) -> Builder<stage::To> {
        self.turns(state)
    }
}

impl<S: AcceptsFrom> Builder<S> {
    /// The state changed away from `value`
    pub fn from(self, value: impl Into<Value>) -> Builder<S::Next> {
        self.from_field(Field::State, value)
    }

    /// `field` changed away from `value`
    ///
    /// Returning to `value` while the debounce window is open cancels the
    /// pending call.
    pub fn from_field(mut self, field: Field, value: impl Into<Value>) -> Builder<S::Next> {
        let value = value.into();
        self.rules.add_call(Rule::field_changed(field.clone()));
        self.rules
            .add_call(Rule::equals(Side::Old, field.clone(), value.clone()));
        self.rules.add_cancel(Rule::equals(Side::New, field, value));
        self.advance()
    }
}

impl<S: AcceptsTo> Builder<S> {
    /// The state changed to `value`
    pub fn to(self, value: impl Into<Value>) -> Builder<S::Next> {
        self.to_field(Field::State, value)
    }

    /// `field` changed to `value`
    ///
    /// Leaving `value` while the debounce window is open cancels the pending
    /// call.
    pub fn to_field(mut self, field: Field, value: impl Into<Value>) -> Builder<S::Next> {
        let value = value.into();
        self.rules.add_call(Rule::field_changed(field.clone()));
        self.rules
            .add_call(Rule::equals(Side::New, field.clone(), value.clone()));
        self.rules.add_cancel(Rule::equals(Side::Old, field, value));
        self.advance()
    }
}

impl<S: AcceptsFor> Builder<S> {
    /// Only call once the rules have held for this long; the last call wins
    pub fn r#for(mut self, value: u64, unit: TimeUnit) -> Builder<stage::Timed> {
        self.timeout = unit.duration(value);
        self.advance()
    }
}
