//! Named channels subscribers register on.

use serde::{Deserialize, Serialize};

/// A named channel for published events.
///
/// The business topics are a closed set; presence rooms are dynamic but
/// namespaced, so a room can never collide with a business topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Every committed inventory mutation.
    Inventory,
    /// Mutations referencing a sale order.
    SaleOrders,
    /// Mutations referencing an import order.
    ImportOrders,
    /// Status-crossing alerts (low stock, out of stock).
    LowStock,
    /// Presence events for one room.
    Presence(String),
}

impl Topic {
    pub fn presence(room: impl Into<String>) -> Self {
        Topic::Presence(room.into())
    }

    /// Stable topic name used in logs.
    pub fn name(&self) -> String {
        match self {
            Topic::Inventory => "inventory".to_string(),
            Topic::SaleOrders => "sale_orders".to_string(),
            Topic::ImportOrders => "import_orders".to_string(),
            Topic::LowStock => "low_stock".to_string(),
            Topic::Presence(room) => format!("presence:{room}"),
        }
    }
}

impl core::fmt::Display for Topic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name())
    }
}
