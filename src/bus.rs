//! Broadcast bus: fan-out of state-change notifications.
//!
//! The store owner publishes; any number of observers subscribe. Delivery
//! to one subscriber never depends on another: a subscriber whose receiving
//! end is gone is pruned and the rest still get the event.
//!
//! Each subscriber receives events in publish order.

// ============================================================================
// Imports
// ============================================================================

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_util::Stream;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::identifiers::SubscriptionId;
use crate::protocol::Broadcast;

// ============================================================================
// Types
// ============================================================================

type SubscriberMap = FxHashMap<SubscriptionId, mpsc::UnboundedSender<Broadcast>>;

// ============================================================================
// BroadcastBus
// ============================================================================

/// Fan-out broker for [`Broadcast`] events.
#[derive(Debug, Clone, Default)]
pub struct BroadcastBus {
    subscribers: Arc<RwLock<SubscriberMap>>,
}

impl BroadcastBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().insert(id, tx);

        debug!(subscription = %id, "Bus subscriber added");

        Subscription {
            id,
            rx,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Delivers `event` to every subscriber.
    ///
    /// Returns the number of subscribers reached. Zero is not an error.
    pub fn publish(&self, event: Broadcast) -> usize {
        let mut delivered = 0;
        let mut gone = Vec::new();

        for (id, tx) in self.subscribers.read().iter() {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                gone.push(*id);
            }
        }

        if !gone.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in &gone {
                subscribers.remove(id);
            }
            debug!(pruned = gone.len(), "Pruned disconnected bus subscribers");
        }

        if delivered == 0 {
            trace!(action = event.action(), tab_id = %event.tab_id(), "Broadcast had no listeners");
        } else {
            trace!(action = event.action(), tab_id = %event.tab_id(), delivered, "Broadcast published");
        }

        delivered
    }

    /// Returns the number of registered subscribers.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A subscriber's receiving end. Unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<Broadcast>,
    subscribers: Weak<RwLock<SubscriberMap>>,
}

impl Subscription {
    /// Returns the subscription ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receives the next event. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Broadcast> {
        self.rx.recv().await
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Broadcast> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Broadcast;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Broadcast>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.write().remove(&self.id);
            trace!(subscription = %self.id, "Bus subscriber removed");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::TabId;

    fn tab(id: u32) -> TabId {
        TabId::new(id).expect("valid tab id")
    }

    fn update(count: usize) -> Broadcast {
        Broadcast::UpdateCount {
            count,
            tab_id: tab(7),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = BroadcastBus::new();
        assert_eq!(bus.publish(update(1)), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_in_order() {
        let bus = BroadcastBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.publish(update(1)), 2);
        assert_eq!(bus.publish(update(2)), 2);

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await, Some(update(1)));
            assert_eq!(sub.recv().await, Some(update(2)));
        }
    }

    #[test]
    fn test_dropped_subscriber_is_removed() {
        let bus = BroadcastBus::new();
        let a = bus.subscribe();
        let mut b = bus.subscribe();
        drop(a);

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(update(3)), 1);
        assert_eq!(b.try_recv(), Some(update(3)));
    }

    #[test]
    fn test_stream_wakes_on_publish() {
        use futures_util::StreamExt;
        use tokio_test::{assert_pending, assert_ready_eq, task};

        let bus = BroadcastBus::new();
        let mut sub = bus.subscribe();
        let mut next = task::spawn(sub.next());

        assert_pending!(next.poll());
        bus.publish(update(4));
        assert!(next.is_woken());
        assert_ready_eq!(next.poll(), Some(update(4)));
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus = BroadcastBus::new();
        let sub = bus.subscribe();
        drop(bus);
        drop(sub);
    }
}
