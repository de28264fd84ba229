//! Topic-keyed subscriber registry with best-effort fan-out.
//!
//! The bus is an explicit, lifecycle-managed object: the owning process
//! constructs it, hands an `Arc` to publishers (the adjustment engine's
//! notifier, the presence registry) and to subscribing components, and drops
//! it on teardown. It is never a global.
//!
//! Each subscription owns a bounded queue drained by blocking or polling
//! receive. Publishing uses non-blocking sends: a subscriber whose queue is
//! full is skipped for that event, and one that disconnected is pruned.
//! Publishers are never blocked by a slow consumer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use tracing::warn;

use fishdock_core::SubscriptionId;

use crate::event::Notification;
use crate::topic::Topic;

const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Lifecycle of one subscription instance.
///
/// `Pending` while the slot is being registered, `Active` once the registry
/// has acknowledged it (before `subscribe` returns), `Closed` after
/// `unsubscribe` or a lost receiver. `Closed` is terminal; resubscribing
/// creates a new instance with a new id.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Pending,
    Active,
    Closed,
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    const PENDING: u8 = 0;
    const ACTIVE: u8 = 1;
    const CLOSED: u8 = 2;

    fn new() -> Self {
        Self(AtomicU8::new(Self::PENDING))
    }

    fn get(&self) -> SubscriptionState {
        match self.0.load(Ordering::Acquire) {
            Self::PENDING => SubscriptionState::Pending,
            Self::ACTIVE => SubscriptionState::Active,
            _ => SubscriptionState::Closed,
        }
    }

    fn activate(&self) {
        // Pending -> Active only; a concurrently closed slot stays closed.
        let _ = self.0.compare_exchange(
            Self::PENDING,
            Self::ACTIVE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn close(&self) {
        self.0.store(Self::CLOSED, Ordering::Release);
    }
}

/// Detachable identity of a subscription, used to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub topic: Topic,
}

/// A live subscription: one bounded queue of notifications for one topic.
///
/// Dropping the subscription closes it; the registry prunes the slot on the
/// next publish to the topic.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    receiver: Receiver<Notification>,
    state: Arc<StateCell>,
}

impl Subscription {
    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            id: self.id,
            topic: self.topic.clone(),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn state(&self) -> SubscriptionState {
        self.state.get()
    }

    /// Block until the next notification.
    pub fn recv(&self) -> Result<Notification, mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Non-blocking poll.
    pub fn try_recv(&self) -> Result<Notification, mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a notification.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Notification, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.state.close();
    }
}

#[derive(Debug)]
struct SubscriberSlot {
    id: SubscriptionId,
    sender: SyncSender<Notification>,
    state: Arc<StateCell>,
}

/// Topic-keyed pub/sub registry.
#[derive(Debug)]
pub struct TopicBus {
    topics: Mutex<HashMap<Topic, Vec<SubscriberSlot>>>,
    queue_capacity: usize,
    dropped_deliveries: AtomicU64,
}

impl TopicBus {
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Per-subscriber queue bound; a subscriber that falls further behind
    /// than this starts losing events rather than blocking publishers.
    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
            dropped_deliveries: AtomicU64::new(0),
        }
    }

    /// Register a new subscription on `topic`.
    ///
    /// The returned subscription is `Active`; it stays subscribed until
    /// `unsubscribe` or drop.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::sync_channel(self.queue_capacity);
        let id = SubscriptionId::new();
        let state = Arc::new(StateCell::new());

        let slot = SubscriberSlot {
            id,
            sender: tx,
            state: state.clone(),
        };

        // If the registry lock is poisoned the subscription still exists,
        // it just never receives anything.
        if let Ok(mut topics) = self.topics.lock() {
            topics.entry(topic.clone()).or_default().push(slot);
            state.activate();
        }

        Subscription {
            id,
            topic,
            receiver: rx,
            state,
        }
    }

    /// Close a subscription. Terminal: the id is never reused.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if let Ok(mut topics) = self.topics.lock() {
            if let Some(slots) = topics.get_mut(&handle.topic) {
                slots.retain(|slot| {
                    if slot.id == handle.id {
                        slot.state.close();
                        false
                    } else {
                        true
                    }
                });
            }
        }
    }

    /// Deliver `notification` to every active subscriber of `topic`.
    ///
    /// Best-effort: full queues are skipped (counted and logged), dead
    /// subscribers are pruned. Returns the number of deliveries.
    pub fn publish(&self, topic: &Topic, notification: Notification) -> usize {
        let Ok(mut topics) = self.topics.lock() else {
            warn!(topic = %topic, "subscriber registry lock poisoned; dropping event");
            return 0;
        };

        let Some(slots) = topics.get_mut(topic) else {
            return 0;
        };

        let mut delivered = 0;
        slots.retain(|slot| {
            if slot.state.get() == SubscriptionState::Closed {
                return false;
            }
            match slot.sender.try_send(notification.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    self.dropped_deliveries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        topic = %topic,
                        subscription_id = %slot.id,
                        "subscriber queue full; skipping delivery"
                    );
                    true
                }
                Err(TrySendError::Disconnected(_)) => {
                    slot.state.close();
                    false
                }
            }
        });

        delivered
    }

    /// Number of currently registered (non-closed) subscribers of `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        match self.topics.lock() {
            Ok(topics) => topics
                .get(topic)
                .map(|slots| {
                    slots
                        .iter()
                        .filter(|s| s.state.get() != SubscriptionState::Closed)
                        .count()
                })
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Total deliveries skipped because a subscriber queue was full.
    pub fn dropped_deliveries(&self) -> u64 {
        self.dropped_deliveries.load(Ordering::Relaxed)
    }
}

impl Default for TopicBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{PresenceAction, PresenceEvent};
    use chrono::Utc;
    use fishdock_core::ParticipantId;
    use uuid::Uuid;

    fn presence_event(room: &str) -> Notification {
        Notification::Presence(PresenceEvent {
            event_id: Uuid::now_v7(),
            room: room.to_string(),
            participant_id: ParticipantId::new(),
            action: PresenceAction::Join,
            metadata: serde_json::json!({}),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn subscribe_is_active_and_receives() {
        let bus = TopicBus::new();
        let sub = bus.subscribe(Topic::Inventory);
        assert_eq!(sub.state(), SubscriptionState::Active);

        assert_eq!(bus.publish(&Topic::Inventory, presence_event("r")), 1);
        assert!(sub.try_recv().is_ok());
    }

    #[test]
    fn publish_reaches_only_the_matching_topic() {
        let bus = TopicBus::new();
        let inventory = bus.subscribe(Topic::Inventory);
        let low_stock = bus.subscribe(Topic::LowStock);

        bus.publish(&Topic::LowStock, presence_event("r"));

        assert!(inventory.try_recv().is_err());
        assert!(low_stock.try_recv().is_ok());
    }

    #[test]
    fn unsubscribe_is_terminal() {
        let bus = TopicBus::new();
        let sub = bus.subscribe(Topic::Inventory);
        let handle = sub.handle();

        bus.unsubscribe(&handle);
        assert_eq!(sub.state(), SubscriptionState::Closed);
        assert_eq!(bus.subscriber_count(&Topic::Inventory), 0);
        assert_eq!(bus.publish(&Topic::Inventory, presence_event("r")), 0);

        // A fresh subscribe is a new instance with a new id.
        let again = bus.subscribe(Topic::Inventory);
        assert_ne!(again.id(), handle.id);
        assert_eq!(again.state(), SubscriptionState::Active);
    }

    #[test]
    fn slow_subscriber_is_skipped_not_blocked() {
        let bus = TopicBus::with_queue_capacity(1);
        let slow = bus.subscribe(Topic::Inventory);
        let healthy = bus.subscribe(Topic::Inventory);

        // First event fills the slow queue (nobody drains it).
        assert_eq!(bus.publish(&Topic::Inventory, presence_event("a")), 2);
        // Second event skips the slow subscriber but still reaches the other.
        assert_eq!(bus.publish(&Topic::Inventory, presence_event("b")), 1);
        assert_eq!(bus.dropped_deliveries(), 1);

        // The slow subscriber stays registered and sees the first event.
        assert!(slow.try_recv().is_ok());
        assert_eq!(bus.subscriber_count(&Topic::Inventory), 2);

        assert!(healthy.try_recv().is_ok());
        assert!(healthy.try_recv().is_ok());
    }

    #[test]
    fn dropped_subscription_is_pruned_on_publish() {
        let bus = TopicBus::new();
        let sub = bus.subscribe(Topic::Inventory);
        drop(sub);

        assert_eq!(bus.publish(&Topic::Inventory, presence_event("r")), 0);
        assert_eq!(bus.subscriber_count(&Topic::Inventory), 0);
    }
}
