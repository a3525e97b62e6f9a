//! Named automations on top of a [`HandlerSet`]
//!
//! Keys identify where an automation came from (a script path, a built-in
//! name). Reloading a script replaces the handler under its key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use ha_trigger::{HandlerId, HandlerSet, TriggerHandler};
use tracing::{info, warn};

#[derive(Default)]
pub struct AutomationRegistry {
    handlers: Arc<HandlerSet>,
    keys: Mutex<HashMap<String, HandlerId>>,
}

impl AutomationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `handler` under `key`
    ///
    /// An automation already registered under `key` is replaced.
    pub fn add(&self, key: impl Into<String>, handler: TriggerHandler) -> HandlerId {
        let key = key.into();
        let mut keys = self.keys();
        if let Some(old) = keys.remove(&key) {
            warn!(automation = %key, "Automation already registered, replacing it");
            self.handlers.detach(old);
        }
        let id = self.handlers.attach(handler);
        info!(automation = %key, handler = %id, "Added automation");
        keys.insert(key, id);
        id
    }

    /// Detach the automation under `key` (if any) and attach `handler` in its place
    pub fn replace(&self, key: impl Into<String>, handler: TriggerHandler) -> HandlerId {
        let key = key.into();
        let mut keys = self.keys();
        if let Some(old) = keys.remove(&key) {
            self.handlers.detach(old);
        }
        let id = self.handlers.attach(handler);
        info!(automation = %key, handler = %id, "Reloaded automation");
        keys.insert(key, id);
        id
    }

    /// Detach the automation under `key`; returns whether there was one
    pub fn remove(&self, key: &str) -> bool {
        match self.keys().remove(key) {
            Some(id) => {
                self.handlers.detach(id);
                info!(automation = %key, "Removed automation");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys().contains_key(key)
    }

    pub fn handler_id(&self, key: &str) -> Option<HandlerId> {
        self.keys().get(key).copied()
    }

    pub fn keys_sorted(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// The handler set events are dispatched through
    pub fn handlers(&self) -> &Arc<HandlerSet> {
        &self.handlers
    }

    fn keys(&self) -> MutexGuard<'_, HashMap<String, HandlerId>> {
        self.keys.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_trigger::when_any;

    fn noop() -> TriggerHandler {
        when_any().r#do(|_| async { anyhow::Ok(()) })
    }

    #[test]
    fn test_add_and_remove() {
        let registry = AutomationRegistry::new();
        let id = registry.add("scripts/porch.rs", noop());

        assert!(registry.contains("scripts/porch.rs"));
        assert_eq!(registry.handler_id("scripts/porch.rs"), Some(id));
        assert!(registry.handlers().contains(id));

        assert!(registry.remove("scripts/porch.rs"));
        assert!(!registry.remove("scripts/porch.rs"));
        assert!(!registry.handlers().contains(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_replace_swaps_handler() {
        let registry = AutomationRegistry::new();
        let first = registry.add("porch", noop());
        let second = registry.replace("porch", noop());

        assert_ne!(first, second);
        assert!(!registry.handlers().contains(first));
        assert!(registry.handlers().contains(second));
        assert_eq!(registry.handlers().len(), 1);
    }

    #[test]
    fn test_replace_unknown_key_adds() {
        let registry = AutomationRegistry::new();
        registry.replace("new", noop());
        assert_eq!(registry.keys_sorted(), vec!["new"]);
    }

    #[test]
    fn test_add_twice_keeps_one() {
        let registry = AutomationRegistry::new();
        registry.add("a", noop());
        registry.add("a", noop());
        registry.add("b", noop());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.handlers().len(), 2);
    }
}
