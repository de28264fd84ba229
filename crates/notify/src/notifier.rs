//! Turns committed ledger mutations into published events.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use fishdock_ledger::{LedgerEntry, Projection, ReferenceKind, StockStatus};

use crate::bus::TopicBus;
use crate::event::{ChangeEvent, Notification, StockAlert};
use crate::topic::Topic;

/// Observes committed `{entry, projection}` pairs and fans them out.
///
/// Runs strictly after commit; nothing here can undo or fail the mutation.
/// A change event always goes to `inventory` (plus the order topic the entry
/// references, if any). An alert goes to `low_stock` exactly when the status
/// crossed into an alertable category; while the status stays unchanged
/// across subsequent mutations no alert is re-emitted.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    bus: Arc<TopicBus>,
}

impl ChangeNotifier {
    pub fn new(bus: Arc<TopicBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<TopicBus> {
        &self.bus
    }

    /// Publish the events for one committed mutation.
    pub fn publish_commit(
        &self,
        previous_status: StockStatus,
        entry: &LedgerEntry,
        projection: &Projection,
        min_stock: i64,
    ) {
        let change = Notification::Change(ChangeEvent {
            event_id: Uuid::now_v7(),
            entry: entry.clone(),
            projection: projection.clone(),
            occurred_at: Utc::now(),
        });

        let mut delivered = self.bus.publish(&Topic::Inventory, change.clone());
        if let Some(topic) = order_topic(entry) {
            delivered += self.bus.publish(&topic, change);
        }

        if is_crossing(previous_status, projection.status) {
            let alert = Notification::Alert(StockAlert {
                event_id: Uuid::now_v7(),
                item_id: entry.item_id,
                status: projection.status,
                quantity: projection.quantity,
                min_stock,
                occurred_at: Utc::now(),
            });
            delivered += self.bus.publish(&Topic::LowStock, alert);
        }

        debug!(
            item_id = %entry.item_id,
            seq = entry.seq,
            status = %projection.status,
            delivered,
            "published commit"
        );
    }
}

/// The order topic a ledger entry belongs on, if it references an order.
fn order_topic(entry: &LedgerEntry) -> Option<Topic> {
    entry.reference.map(|r| match r.reference_type {
        ReferenceKind::SaleOrder => Topic::SaleOrders,
        ReferenceKind::ImportOrder => Topic::ImportOrders,
    })
}

/// An alert fires only on the transition into an alertable category.
fn is_crossing(previous: StockStatus, current: StockStatus) -> bool {
    previous != current && current.is_alertable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fishdock_core::{ActorId, EntryId, ItemId};
    use fishdock_ledger::{classify, EntryKind, Reference};

    fn committed(
        item_id: ItemId,
        before: i64,
        change: i64,
        min_stock: i64,
        reference: Option<Reference>,
    ) -> (LedgerEntry, Projection) {
        let after = before + change;
        let entry = LedgerEntry {
            seq: 1,
            entry_id: EntryId::new(),
            item_id,
            kind: if change >= 0 { EntryKind::Import } else { EntryKind::Sale },
            quantity_change: change,
            quantity_before: before,
            quantity_after: after,
            reference,
            note: None,
            loss_reason: None,
            actor_id: ActorId::new(),
            created_at: Utc::now(),
        };
        let projection = Projection {
            item_id,
            quantity: after,
            status: classify(after, min_stock),
            version: 1,
            updated_at: entry.created_at,
        };
        (entry, projection)
    }

    #[test]
    fn crossing_into_low_stock_alerts_once() {
        assert!(is_crossing(StockStatus::InStock, StockStatus::LowStock));
        assert!(is_crossing(StockStatus::LowStock, StockStatus::OutOfStock));
        assert!(is_crossing(StockStatus::InStock, StockStatus::OutOfStock));
        // No re-alert while the status stays put, none on recovery.
        assert!(!is_crossing(StockStatus::LowStock, StockStatus::LowStock));
        assert!(!is_crossing(StockStatus::OutOfStock, StockStatus::OutOfStock));
        assert!(!is_crossing(StockStatus::LowStock, StockStatus::InStock));
    }

    #[test]
    fn commit_publishes_change_and_alert_on_crossing() {
        let bus = Arc::new(TopicBus::new());
        let notifier = ChangeNotifier::new(bus.clone());
        let inventory = bus.subscribe(Topic::Inventory);
        let low_stock = bus.subscribe(Topic::LowStock);

        let item_id = ItemId::new();
        let (entry, projection) = committed(item_id, 30, -15, 20, None);
        notifier.publish_commit(StockStatus::InStock, &entry, &projection, 20);

        assert!(matches!(inventory.try_recv(), Ok(Notification::Change(_))));
        match low_stock.try_recv() {
            Ok(Notification::Alert(alert)) => {
                assert_eq!(alert.item_id, item_id);
                assert_eq!(alert.quantity, 15);
                assert_eq!(alert.min_stock, 20);
                assert_eq!(alert.status, StockStatus::LowStock);
            }
            other => panic!("expected alert, got {other:?}"),
        }
    }

    #[test]
    fn unchanged_status_does_not_re_alert() {
        let bus = Arc::new(TopicBus::new());
        let notifier = ChangeNotifier::new(bus.clone());
        let low_stock = bus.subscribe(Topic::LowStock);

        let item_id = ItemId::new();
        let (entry, projection) = committed(item_id, 15, -3, 20, None);
        notifier.publish_commit(StockStatus::LowStock, &entry, &projection, 20);

        assert!(low_stock.try_recv().is_err());
    }

    #[test]
    fn order_reference_routes_to_the_order_topic() {
        let bus = Arc::new(TopicBus::new());
        let notifier = ChangeNotifier::new(bus.clone());
        let sale_orders = bus.subscribe(Topic::SaleOrders);
        let import_orders = bus.subscribe(Topic::ImportOrders);

        let item_id = ItemId::new();
        let reference = Reference {
            reference_type: ReferenceKind::SaleOrder,
            reference_id: Uuid::now_v7(),
        };
        let (entry, projection) = committed(item_id, 100, -10, 20, Some(reference));
        notifier.publish_commit(StockStatus::InStock, &entry, &projection, 20);

        assert!(sale_orders.try_recv().is_ok());
        assert!(import_orders.try_recv().is_err());
    }
}
