//! Current-quantity projection derived from the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fishdock_core::ItemId;

use crate::status::StockStatus;

/// Current derived state of one item.
///
/// Mutated exclusively by the adjustment engine through the store's atomic
/// append; always reconstructible by replaying the item's ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub item_id: ItemId,
    pub quantity: i64,
    pub status: StockStatus,
    /// Optimistic-concurrency token, incremented once per committed append.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Projection {
    /// Zero-quantity row created on an item's first reference.
    pub fn seed(item_id: ItemId, status: StockStatus, now: DateTime<Utc>) -> Self {
        Self {
            item_id,
            quantity: 0,
            status,
            version: 0,
            updated_at: now,
        }
    }
}
