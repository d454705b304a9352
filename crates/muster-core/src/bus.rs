//! Event bus for inbound gateway events.
//!
//! The bus fans every [`GatewayEvent`] out to all current subscribers.
//! Handlers run synchronously on whichever task calls [`EventBus::dispatch`],
//! and may subscribe or unsubscribe (including themselves) while running.

use crate::metrics;
use dashmap::DashMap;
use muster_protocol::GatewayEvent;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// A subscription identifier.
pub type SubscriptionId = u64;

type Handler = Arc<dyn Fn(&GatewayEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    handlers: DashMap<SubscriptionId, Handler>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self.handlers.remove(&id).is_some();
        if removed {
            debug!(subscription = id, "Unsubscribed");
        }
        removed
    }
}

/// Broadcasts gateway events to registered handlers.
///
/// Cloning an `EventBus` yields another handle to the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// cancelled or dropped.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.handlers.insert(id, Arc::new(handler));

        debug!(
            subscription = id,
            subscribers = self.inner.handlers.len(),
            "Subscribed"
        );

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a handler.
    ///
    /// Returns `true` if it was registered. Removing an unknown or already
    /// removed handler is a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.remove(id)
    }

    /// Deliver an event to every current subscriber, in subscription order.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, event: &GatewayEvent) -> usize {
        // No map guard may be held while handlers run: they are allowed to
        // unsubscribe themselves.
        let mut handlers: Vec<(SubscriptionId, Handler)> = self
            .inner
            .handlers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        handlers.sort_unstable_by_key(|(id, _)| *id);

        let mut delivered = 0;
        for (id, handler) in handlers {
            // Skip handlers removed by an earlier handler of this dispatch.
            if !self.inner.handlers.contains_key(&id) {
                continue;
            }
            handler(event);
            delivered += 1;
        }

        trace!(event = event.name(), recipients = delivered, "Dispatched event");
        metrics::record_dispatch(event.name());
        delivered
    }

    /// Get the number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.handlers.len()
    }

    /// Check whether a handler is registered.
    #[must_use]
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.inner.handlers.contains_key(&id)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Capability to remove one handler from the bus.
///
/// Cancelling is idempotent. Dropping the subscription cancels it.
pub struct Subscription {
    id: SubscriptionId,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Get the subscription id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the handler from the bus.
    ///
    /// Returns `true` only for the call that actually removed it.
    pub fn cancel(&self) -> bool {
        self.bus
            .upgrade()
            .map(|bus| bus.remove(self.id))
            .unwrap_or(false)
    }

    /// Check whether the handler is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.bus
            .upgrade()
            .map(|bus| bus.handlers.contains_key(&self.id))
            .unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
