//! Fan-out of state-changed events to attached triggers

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use ha_core::events::StateChangedData;
use ha_core::Event;
use indexmap::IndexMap;
use tracing::{debug, error};

use crate::handler::TriggerHandler;

/// Identifies an attached handler within one [`HandlerSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Outcome of one [`HandlerSet::dispatch`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that evaluated the event without error
    pub handled: usize,
    /// Handlers that returned an error
    pub failed: Vec<HandlerId>,
}

/// Ordered set of attached triggers
///
/// Handlers see each event in attach order. A handler that errors is logged
/// and recorded in the report; the rest still run.
#[derive(Default)]
pub struct HandlerSet {
    next_id: AtomicU64,
    handlers: RwLock<IndexMap<HandlerId, Arc<TriggerHandler>>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, handler: TriggerHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.write().insert(id, Arc::new(handler));
        debug!(handler = %id, "Attached trigger");
        id
    }

    /// Remove a handler, dropping any call it has pending
    pub fn detach(&self, id: HandlerId) -> bool {
        match self.write().shift_remove(&id) {
            Some(handler) => {
                handler.cancel();
                debug!(handler = %id, "Detached trigger");
                true
            }
            None => false,
        }
    }

    /// Swap the handler behind `id` in place, keeping its position
    ///
    /// The old handler's pending call is dropped. Returns false (and attaches
    /// nothing) if `id` is unknown.
    pub fn replace(&self, id: HandlerId, handler: TriggerHandler) -> bool {
        let old = match self.write().get_mut(&id) {
            Some(slot) => std::mem::replace(slot, Arc::new(handler)),
            None => return false,
        };
        old.cancel();
        debug!(handler = %id, "Replaced trigger");
        true
    }

    pub fn contains(&self, id: HandlerId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Run every handler against `event`
    pub async fn dispatch(&self, event: &Event<StateChangedData>) -> DispatchReport {
        // Snapshot so attach/detach during a slow callback does not block
        let handlers: Vec<_> = self
            .read()
            .iter()
            .map(|(id, handler)| (*id, handler.clone()))
            .collect();

        let mut report = DispatchReport::default();
        for (id, handler) in handlers {
            match handler.handle(event).await {
                Ok(()) => report.handled += 1,
                Err(e) => {
                    error!(
                        handler = %id,
                        entity_id = %event.data.entity_id,
                        error = %e,
                        "Trigger failed"
                    );
                    report.failed.push(id);
                }
            }
        }
        report
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<HandlerId, Arc<TriggerHandler>>> {
        self.handlers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<HandlerId, Arc<TriggerHandler>>> {
        self.handlers.write().unwrap_or_else(|e| e.into_inner())
    }
}
