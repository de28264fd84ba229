//! Events published to topic subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use fishdock_core::{ItemId, ParticipantId};
use fishdock_ledger::{LedgerEntry, Projection, StockStatus};

/// A committed inventory mutation, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event_id: Uuid,
    pub entry: LedgerEntry,
    pub projection: Projection,
    pub occurred_at: DateTime<Utc>,
}

/// Fired exactly when an item's status crosses into an alertable category.
///
/// Carries the crossing target so `low_stock` subscribers can distinguish
/// low-stock from out-of-stock without a second read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub event_id: Uuid,
    pub item_id: ItemId,
    pub status: StockStatus,
    pub quantity: i64,
    pub min_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Join/leave direction of a presence event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceAction {
    Join,
    Leave,
}

/// A participant entering or leaving a presence room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub event_id: Uuid,
    pub room: String,
    pub participant_id: ParticipantId,
    pub action: PresenceAction,
    /// Last known participant metadata (viewing context, display name).
    pub metadata: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

/// The unit delivered to subscribers. Closed union; handlers match
/// exhaustively on the variants their topic can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Change(ChangeEvent),
    Alert(StockAlert),
    Presence(PresenceEvent),
}

impl Notification {
    pub fn event_id(&self) -> Uuid {
        match self {
            Notification::Change(e) => e.event_id,
            Notification::Alert(e) => e.event_id,
            Notification::Presence(e) => e.event_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Notification::Change(e) => e.occurred_at,
            Notification::Alert(e) => e.occurred_at,
            Notification::Presence(e) => e.occurred_at,
        }
    }
}
