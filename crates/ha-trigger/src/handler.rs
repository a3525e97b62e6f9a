//! Sealed triggers: rule evaluation in front of a debounced callback

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use ha_core::events::StateChangedData;
use ha_core::Event;
use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::debounce::{Debouncer, Delivery, Phase};
use crate::error::{TriggerError, TriggerResult};
use crate::rule::Rule;

/// The user callback behind a trigger
pub type Callback = Delivery<Event<StateChangedData>>;

/// Box an async closure into a [`Callback`]
pub fn callback<F, Fut>(f: F) -> Callback
where
    F: Fn(Event<StateChangedData>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event: Event<StateChangedData>| f(event).boxed())
}

type RuleMap = IndexMap<[u8; 32], Rule>;

/// Rules of one trigger, kept in insertion order and deduplicated by hash
///
/// Scope rules restrict which events the trigger looks at (the entity
/// filter). They gate cancellation but never cause it on their own; only
/// cancel rules do.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    call: RuleMap,
    scope: RuleMap,
    cancel: RuleMap,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a call rule; returns false if an identical rule was already there
    pub fn add_call(&mut self, rule: Rule) -> bool {
        insert(&mut self.call, rule)
    }

    pub fn add_scope(&mut self, rule: Rule) -> bool {
        insert(&mut self.scope, rule)
    }

    pub fn add_cancel(&mut self, rule: Rule) -> bool {
        insert(&mut self.cancel, rule)
    }

    pub fn with_call(mut self, rule: Rule) -> Self {
        self.add_call(rule);
        self
    }

    pub fn with_scope(mut self, rule: Rule) -> Self {
        self.add_scope(rule);
        self
    }

    pub fn with_cancel(mut self, rule: Rule) -> Self {
        self.add_cancel(rule);
        self
    }

    pub fn call_rules(&self) -> impl Iterator<Item = &Rule> {
        self.call.values()
    }

    pub fn scope_rules(&self) -> impl Iterator<Item = &Rule> {
        self.scope.values()
    }

    pub fn cancel_rules(&self) -> impl Iterator<Item = &Rule> {
        self.cancel.values()
    }

    /// Every call rule holds
    pub fn all_call(&self, data: &StateChangedData) -> bool {
        self.call.values().all(|rule| rule.test(data))
    }

    /// There is at least one cancel rule and every scope and cancel rule holds
    ///
    /// The entity filter is a scope rule, not a cancel rule. A single `from`
    /// or `to` is therefore enough to cancel: `when_any().to("on").r#for(..)`
    /// cancels on any entity moving to "on", and a plain entity filter
    /// never cancels on its own.
    pub fn all_cancel(&self, data: &StateChangedData) -> bool {
        !self.cancel.is_empty()
            && self.scope.values().all(|rule| rule.test(data))
            && self.cancel.values().all(|rule| rule.test(data))
    }
}

fn insert(map: &mut RuleMap, rule: Rule) -> bool {
    let key = *rule.hash().as_bytes();
    if map.contains_key(&key) {
        return false;
    }
    map.insert(key, rule);
    true
}

/// A compiled trigger
///
/// Produced by `Builder::r#do` or [`TriggerHandler::from_rules`]; immutable
/// apart from its debounce state.
pub struct TriggerHandler {
    rules: RuleSet,
    timeout: Duration,
    debouncer: Debouncer<Event<StateChangedData>>,
}

impl TriggerHandler {
    /// Compile a hand-made rule set
    pub fn from_rules(rules: RuleSet, timeout: Duration, callback: Callback) -> Self {
        Self {
            rules,
            timeout,
            debouncer: Debouncer::new(timeout, callback),
        }
    }

    /// Evaluate the rules against one event and schedule or cancel the callback
    ///
    /// Returns [`TriggerError::Logic`] when the event both qualifies and
    /// cancels; nothing is scheduled or cancelled in that case.
    pub async fn handle(&self, event: &Event<StateChangedData>) -> TriggerResult<()> {
        let data = &event.data;
        let all_call = self.rules.all_call(data);
        let all_cancel = !self.timeout.is_zero() && self.rules.all_cancel(data);

        trace!(
            entity_id = %data.entity_id,
            all_call,
            all_cancel,
            "Evaluated trigger rules"
        );

        if all_call && all_cancel {
            return Err(TriggerError::Logic(format!(
                "event for {} satisfies both call and cancel rules",
                data.entity_id
            )));
        }

        if (all_call || all_cancel) && self.debouncer.cancel() {
            debug!(entity_id = %data.entity_id, "Cancelled pending trigger call");
        }

        if all_call {
            self.debouncer.call(event.clone()).await;
        }

        Ok(())
    }

    /// Drop a pending debounced call
    pub fn cancel(&self) -> bool {
        self.debouncer.cancel()
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.phase() == Phase::Pending
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }
}

impl std::fmt::Debug for TriggerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerHandler")
            .field("rules", &self.rules)
            .field("timeout", &self.timeout)
            .field("phase", &self.debouncer.phase())
            .finish()
    }
}
