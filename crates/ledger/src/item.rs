//! Item master data (read-only to the ledger core).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use fishdock_core::ItemId;

/// An inventory item as maintained by the external master-data layer.
///
/// The ledger engine only reads this; creating and editing items is the
/// catalog owner's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub sku: String,
    pub name: String,
    /// Threshold at or below which a positive quantity classifies as low stock.
    pub min_stock: i64,
    /// Unit of measure ("kg", "box", "crate").
    pub unit: String,
}

/// Read-only master-data lookup consumed by the adjustment engine.
pub trait ItemCatalog: Send + Sync {
    fn get(&self, item_id: ItemId) -> Option<Item>;
}

impl<C> ItemCatalog for Arc<C>
where
    C: ItemCatalog + ?Sized,
{
    fn get(&self, item_id: ItemId) -> Option<Item> {
        (**self).get(item_id)
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    items: RwLock<HashMap<ItemId, Item>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: Item) {
        if let Ok(mut items) = self.items.write() {
            items.insert(item.id, item);
        }
    }
}

impl ItemCatalog for InMemoryCatalog {
    fn get(&self, item_id: ItemId) -> Option<Item> {
        let items = self.items.read().ok()?;
        items.get(&item_id).cloned()
    }
}
