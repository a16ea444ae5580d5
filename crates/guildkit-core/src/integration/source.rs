//! Named-event subscription and dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::foundation::BoxedEvent;

/// A listener callback.
///
/// The callback itself runs synchronously on the emitting thread and returns
/// the future doing the actual work. This split lets wrappers make decisions
/// (filtering, in-flight accounting) at the exact moment of dispatch.
pub type Listener = Arc<dyn Fn(BoxedEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle returned by [`EventSource::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Returns the raw identifier.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// EventSource
// =============================================================================

/// Anything that can register and deregister named event listeners.
///
/// This is the only capability the runtime requires from a gateway client.
pub trait EventSource: Send + Sync {
    /// Registers `listener` for events named `event_name`.
    fn subscribe(&self, event_name: &str, listener: Listener) -> SubscriptionId;

    /// Removes a subscription. Returns `false` if it was already removed.
    ///
    /// After this returns, the listener is never invoked again, including by
    /// an emission that is currently iterating over subscribers.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

// =============================================================================
// EventBus
// =============================================================================

struct Subscription {
    id: SubscriptionId,
    listener: Listener,
    active: AtomicBool,
}

/// In-process [`EventSource`].
///
/// Dispatch iterates over a snapshot of the subscriber list taken when the
/// emission starts: a listener subscribed while event *n* is being dispatched
/// first sees event *n + 1*. A listener unsubscribed mid-dispatch is skipped
/// for the rest of that dispatch.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<HashMap<String, Vec<Arc<Subscription>>>>,
    index: RwLock<HashMap<SubscriptionId, String>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty bus wrapped in an `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn snapshot(&self, event_name: &str) -> Vec<Arc<Subscription>> {
        self.subscriptions
            .read()
            .get(event_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Emits an event, spawning each listener's future onto the current
    /// tokio runtime.
    ///
    /// Every listener callback has been invoked by the time this returns; the
    /// futures they produced may still be running.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime while any listener is
    /// subscribed to the event.
    pub fn emit(&self, event: impl Into<BoxedEvent>) -> usize {
        let event = event.into();
        let subscribers = self.snapshot(event.event_name());
        trace!(
            event = event.event_name(),
            subscribers = subscribers.len(),
            "Emitting event"
        );

        let mut delivered = 0;
        for subscription in subscribers {
            if !subscription.active.load(Ordering::Acquire) {
                continue;
            }
            let fut = (subscription.listener)(event.clone());
            tokio::spawn(fut);
            delivered += 1;
        }
        delivered
    }

    /// Emits an event and awaits every listener's future in subscription
    /// order.
    pub async fn emit_and_wait(&self, event: impl Into<BoxedEvent>) -> usize {
        let event = event.into();
        let subscribers = self.snapshot(event.event_name());

        let mut delivered = 0;
        for subscription in subscribers {
            if !subscription.active.load(Ordering::Acquire) {
                continue;
            }
            (subscription.listener)(event.clone()).await;
            delivered += 1;
        }
        delivered
    }

    /// Returns the number of live subscriptions for `event_name`.
    pub fn listener_count(&self, event_name: &str) -> usize {
        self.subscriptions
            .read()
            .get(event_name)
            .map_or(0, Vec::len)
    }

    /// Returns the number of live subscriptions across all event names.
    pub fn total_listener_count(&self) -> usize {
        self.index.read().len()
    }
}

impl EventSource for EventBus {
    fn subscribe(&self, event_name: &str, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let subscription = Arc::new(Subscription {
            id,
            listener,
            active: AtomicBool::new(true),
        });

        self.subscriptions
            .write()
            .entry(event_name.to_string())
            .or_default()
            .push(subscription);

        self.index.write().insert(id, event_name.to_string());
        debug!(event = event_name, subscription = %id, "Listener subscribed");
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Some(event_name) = self.index.write().remove(&id) else {
            return false;
        };

        let mut subscriptions = self.subscriptions.write();
        if let Some(list) = subscriptions.get_mut(&event_name) {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                list[pos].active.store(false, Ordering::Release);
                list.remove(pos);
            }
            if list.is_empty() {
                subscriptions.remove(&event_name);
            }
        }
        debug!(event = %event_name, subscription = %id, "Listener unsubscribed");
        true
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.total_listener_count())
            .finish()
    }
}
