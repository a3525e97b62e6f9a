//! Subscription registry: one hub subscription and one local stream per event type
//!
//! The hub sends one `event` frame per matching subscription, tagged with that
//! subscription's id. Frames are routed by that id, so a state change seen by
//! both a `"*"` and a `"state_changed"` subscription reaches each stream once.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;

use dashmap::DashMap;
use ha_core::{Event, EventData, EventType};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, trace, warn};

use crate::error::ClientResult;

/// Hub-side record of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubSubscription {
    /// Id to pass to `unsubscribe_events`; `None` when the hub reported the
    /// subscription as already existing and we never learned its id
    pub handle: Option<u64>,
}

/// Event streams and hub subscriptions of one connection
pub struct SubscriptionRegistry {
    streams: DashMap<EventType, broadcast::Sender<Event<Value>>>,
    /// Hub handle -> the stream its frames belong to
    routes: DashMap<u64, EventType>,
    hub: Mutex<HashMap<EventType, HubSubscription>>,
    capacity: usize,
}

impl SubscriptionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            streams: DashMap::new(),
            routes: DashMap::new(),
            hub: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Receiver on the local stream for `event_type`, creating the stream if needed
    pub fn stream(&self, event_type: &EventType) -> broadcast::Receiver<Event<Value>> {
        self.streams
            .entry(event_type.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Make sure the hub has a subscription for `event_type`
    ///
    /// `subscribe` runs only when no subscription is recorded yet and must
    /// resolve to the hub handle. The registry lock is held across it, so
    /// concurrent callers for one type produce a single `subscribe_events`.
    /// Returns whether a new subscription was made.
    pub async fn ensure_subscribed<F, Fut>(
        &self,
        event_type: &EventType,
        subscribe: F,
    ) -> ClientResult<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<u64>>,
    {
        let mut hub = self.hub.lock().await;
        if hub.contains_key(event_type) {
            trace!(event_type = %event_type, "Already subscribed");
            return Ok(false);
        }

        match subscribe().await {
            Ok(handle) => {
                debug!(event_type = %event_type, handle, "Subscribed to events");
                hub.insert(
                    event_type.clone(),
                    HubSubscription {
                        handle: Some(handle),
                    },
                );
                Ok(true)
            }
            Err(e) if e.is_already_subscribed() => {
                debug!(event_type = %event_type, "Hub already had a subscription");
                hub.insert(event_type.clone(), HubSubscription { handle: None });
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Send frames tagged with `handle` to the stream of `event_type`
    ///
    /// Must be recorded before the `subscribe_events` command goes out, as the
    /// hub may fire events right behind its result.
    pub fn route(&self, handle: u64, event_type: &EventType) {
        self.routes.insert(handle, event_type.clone());
    }

    pub fn unroute(&self, handle: u64) {
        self.routes.remove(&handle);
    }

    /// Remove and return the hub subscription for `event_type`, ending its local stream
    pub async fn take(&self, event_type: &EventType) -> Option<HubSubscription> {
        let removed = self.hub.lock().await.remove(event_type);
        if removed.is_some() {
            self.streams.remove(event_type);
            self.routes.retain(|_, routed| *routed != *event_type);
        }
        removed
    }

    pub async fn is_subscribed(&self, event_type: &EventType) -> bool {
        self.hub.lock().await.contains_key(event_type)
    }

    /// Broadcast an event frame to the stream owning `subscription`
    ///
    /// Frames with a missing or unknown id (a subscription the hub already
    /// had before we asked) go to the stream of the event's own type.
    /// Returns the number of receivers it was delivered to.
    pub fn dispatch(&self, subscription: Option<u64>, event: Event<Value>) -> usize {
        let routed = subscription.and_then(|id| self.routes.get(&id).map(|entry| entry.clone()));
        let target = match routed {
            Some(event_type) => event_type,
            None => {
                trace!(subscription = ?subscription, event_type = %event.event_type, "Unrouted event frame");
                event.event_type.clone()
            }
        };

        match self.streams.get(&target) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop every stream so all listeners observe the end of the connection
    pub fn close(&self) {
        self.streams.clear();
        self.routes.clear();
    }
}

/// A listener on one event type's stream
///
/// Dropping it (or calling [`detach`](Self::detach)) stops local delivery;
/// the hub subscription stays until `remove_event_listener`.
pub struct Subscription {
    event_type: EventType,
    receiver: broadcast::Receiver<Event<Value>>,
}

impl Subscription {
    pub(crate) fn new(event_type: EventType, receiver: broadcast::Receiver<Event<Value>>) -> Self {
        Self {
            event_type,
            receiver,
        }
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// Next event, or `None` once the stream has ended
    ///
    /// A listener that falls behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<Event<Value>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(event_type = %self.event_type, skipped = n, "Listener lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// View this stream as typed events, skipping payloads that do not parse
    pub fn typed<T: EventData + serde::de::DeserializeOwned>(self) -> TypedSubscription<T> {
        TypedSubscription {
            inner: self,
            _phantom: PhantomData,
        }
    }

    pub fn detach(self) {
        debug!(event_type = %self.event_type, "Detaching listener");
    }
}

/// A [`Subscription`] yielding parsed payloads
pub struct TypedSubscription<T> {
    inner: Subscription,
    _phantom: PhantomData<T>,
}

impl<T: EventData + serde::de::DeserializeOwned> TypedSubscription<T> {
    pub async fn recv(&mut self) -> Option<Event<T>> {
        loop {
            let event = self.inner.recv().await?;
            match event.into_typed::<T>() {
                Ok(typed) => return Some(typed),
                Err(e) => warn!(error = %e, "Skipping event with unexpected payload"),
            }
        }
    }

    pub fn event_type(&self) -> &EventType {
        self.inner.event_type()
    }

    pub fn detach(self) {
        self.inner.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use ha_core::Context;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(event_type: &str) -> Event<Value> {
        Event::new(event_type, json!({"n": 1}), Context::new())
    }

    #[tokio::test]
    async fn test_subscribe_once_per_event_type() {
        let registry = SubscriptionRegistry::new(16);
        let calls = AtomicUsize::new(0);
        let kind = EventType::from("custom_event");

        for _ in 0..3 {
            registry
                .ensure_subscribed(&kind, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(41)
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            registry.take(&kind).await,
            Some(HubSubscription { handle: Some(41) })
        );
        assert!(!registry.is_subscribed(&kind).await);
    }

    #[tokio::test]
    async fn test_existing_hub_subscription_is_swallowed() {
        let registry = SubscriptionRegistry::new(16);
        let kind = EventType::from("custom_event");

        let made = registry
            .ensure_subscribed(&kind, || async {
                Err(ClientError::Command {
                    code: "unknown_error".into(),
                    message: "Subscription already exists".into(),
                })
            })
            .await
            .unwrap();

        assert!(!made);
        assert!(registry.is_subscribed(&kind).await);
    }

    #[tokio::test]
    async fn test_other_subscribe_failures_propagate() {
        let registry = SubscriptionRegistry::new(16);
        let kind = EventType::from("custom_event");

        let result = registry
            .ensure_subscribed(&kind, || async {
                Err(ClientError::Command {
                    code: "unauthorized".into(),
                    message: "Unauthorized".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert!(!registry.is_subscribed(&kind).await);
    }

    #[tokio::test]
    async fn test_dispatch_by_subscription_id() {
        let registry = SubscriptionRegistry::new(16);
        let mut a = Subscription::new("event_a".into(), registry.stream(&"event_a".into()));
        let mut b = Subscription::new("event_b".into(), registry.stream(&"event_b".into()));
        let mut all = Subscription::new(EventType::match_all(), registry.stream(&EventType::match_all()));
        registry.route(1, &EventType::match_all());
        registry.route(2, &"event_a".into());

        // The hub sends one frame per matching subscription
        assert_eq!(registry.dispatch(Some(1), event("event_a")), 1);
        assert_eq!(registry.dispatch(Some(2), event("event_a")), 1);

        assert_eq!(a.recv().await.unwrap().event_type.as_str(), "event_a");
        assert_eq!(all.recv().await.unwrap().event_type.as_str(), "event_a");
        assert!(a.receiver.try_recv().is_err());
        assert!(all.receiver.try_recv().is_err());
        assert!(b.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unrouted_frames_follow_event_type() {
        let registry = SubscriptionRegistry::new(16);
        let mut a = Subscription::new("event_a".into(), registry.stream(&"event_a".into()));
        let mut all = Subscription::new(EventType::match_all(), registry.stream(&EventType::match_all()));

        assert_eq!(registry.dispatch(Some(99), event("event_a")), 1);
        assert_eq!(registry.dispatch(None, event("event_a")), 1);

        assert!(a.recv().await.is_some());
        assert!(a.recv().await.is_some());
        assert!(all.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_take_drops_routes() {
        let registry = SubscriptionRegistry::new(16);
        let kind = EventType::from("event_a");
        registry.stream(&kind);
        registry.route(4, &kind);
        registry.ensure_subscribed(&kind, || async { Ok(4) }).await.unwrap();

        registry.take(&kind).await;
        assert!(registry.routes.is_empty());
        assert_eq!(registry.dispatch(Some(4), event("event_a")), 0);
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let registry = SubscriptionRegistry::new(16);
        let mut sub = Subscription::new("event_a".into(), registry.stream(&"event_a".into()));
        registry.close();
        assert!(sub.recv().await.is_none());
    }
}
