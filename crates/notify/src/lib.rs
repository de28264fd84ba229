//! `fishdock-notify` — best-effort change notification fan-out.
//!
//! A topic-keyed subscriber registry with bounded per-subscriber queues,
//! the change notifier that turns committed ledger mutations into events
//! (including status-crossing alerts), and presence rooms.
//!
//! Delivery is at-most-once per connected subscriber and is never allowed
//! to block or fail a committed mutation; subscribers needing strict
//! consistency reconcile against the ledger itself.

pub mod bus;
pub mod event;
pub mod notifier;
pub mod presence;
pub mod topic;

pub use bus::{Subscription, SubscriptionHandle, SubscriptionState, TopicBus};
pub use event::{ChangeEvent, Notification, PresenceAction, PresenceEvent, StockAlert};
pub use notifier::ChangeNotifier;
pub use presence::{PresenceDiff, PresenceRegistry};
pub use topic::Topic;
