//! Ledger entries: the immutable audit record of one inventory mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fishdock_core::{ActorId, EntryId, ItemId, LedgerError, LedgerResult};

use crate::status::StockStatus;

/// Kind of an inventory mutation.
///
/// Closed union: adding a kind is a compile-time-checked change, every
/// `match` over it is exhaustive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Import,
    Sale,
    Adjustment,
    Loss,
}

impl EntryKind {
    /// Stable identifier used in logs and persisted rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Import => "import",
            EntryKind::Sale => "sale",
            EntryKind::Adjustment => "adjustment",
            EntryKind::Loss => "loss",
        }
    }
}

impl core::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a manual stock adjustment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentDirection {
    Add,
    Reduce,
}

/// A requested inventory mutation, before validation.
///
/// All quantities are magnitudes and must be positive; the sign is derived
/// from the variant (and direction, for adjustments).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeltaSpec {
    Import { qty: i64 },
    Sale { qty: i64 },
    Adjustment { qty: i64, direction: AdjustmentDirection },
    Loss { qty: i64, reason: String },
}

impl DeltaSpec {
    pub fn kind(&self) -> EntryKind {
        match self {
            DeltaSpec::Import { .. } => EntryKind::Import,
            DeltaSpec::Sale { .. } => EntryKind::Sale,
            DeltaSpec::Adjustment { .. } => EntryKind::Adjustment,
            DeltaSpec::Loss { .. } => EntryKind::Loss,
        }
    }

    fn qty(&self) -> i64 {
        match self {
            DeltaSpec::Import { qty }
            | DeltaSpec::Sale { qty }
            | DeltaSpec::Adjustment { qty, .. }
            | DeltaSpec::Loss { qty, .. } => *qty,
        }
    }

    /// Reject malformed specs before any storage is touched.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.qty() <= 0 {
            return Err(LedgerError::validation(format!(
                "{} quantity must be positive (got {})",
                self.kind(),
                self.qty()
            )));
        }
        if let DeltaSpec::Loss { reason, .. } = self {
            if reason.trim().is_empty() {
                return Err(LedgerError::validation("loss reason cannot be empty"));
            }
        }
        Ok(())
    }

    /// Signed quantity change this spec applies to the projection.
    ///
    /// Imports and additive adjustments increase stock; sales, losses and
    /// reductive adjustments decrease it.
    pub fn signed_delta(&self) -> i64 {
        match self {
            DeltaSpec::Import { qty } => *qty,
            DeltaSpec::Sale { qty } => -qty,
            DeltaSpec::Adjustment { qty, direction } => match direction {
                AdjustmentDirection::Add => *qty,
                AdjustmentDirection::Reduce => -qty,
            },
            DeltaSpec::Loss { qty, .. } => -qty,
        }
    }

    /// Loss reason, for `Loss` specs.
    pub fn loss_reason(&self) -> Option<&str> {
        match self {
            DeltaSpec::Loss { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Kind of the business document a ledger entry references.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    SaleOrder,
    ImportOrder,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::SaleOrder => "sale_order",
            ReferenceKind::ImportOrder => "import_order",
        }
    }
}

/// Optional link from a ledger entry back to the originating document.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub reference_type: ReferenceKind,
    pub reference_id: Uuid,
}

/// An entry ready to be committed, before the store assigns its global
/// sequence number.
///
/// Built by the adjustment engine from a validated [`DeltaSpec`] and the
/// freshly-read projection; `quantity_before`/`quantity_after` already chain
/// against the item's last committed entry, and `status_after` is the
/// projection status the store writes in the same atomic unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub entry_id: EntryId,
    pub item_id: ItemId,
    pub kind: EntryKind,
    pub quantity_change: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub status_after: StockStatus,
    pub reference: Option<Reference>,
    pub note: Option<String>,
    pub loss_reason: Option<String>,
    pub actor_id: ActorId,
    pub created_at: DateTime<Utc>,
}

/// One committed, immutable ledger entry.
///
/// Identical to its draft plus the store-assigned `seq`, a strictly
/// increasing commit-order position across the whole ledger. Entries are
/// never mutated or deleted; reversal is a new compensating entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub seq: u64,
    pub entry_id: EntryId,
    pub item_id: ItemId,
    pub kind: EntryKind,
    pub quantity_change: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub reference: Option<Reference>,
    pub note: Option<String>,
    pub loss_reason: Option<String>,
    pub actor_id: ActorId,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn from_draft(draft: EntryDraft, seq: u64) -> Self {
        Self {
            seq,
            entry_id: draft.entry_id,
            item_id: draft.item_id,
            kind: draft.kind,
            quantity_change: draft.quantity_change,
            quantity_before: draft.quantity_before,
            quantity_after: draft.quantity_after,
            reference: draft.reference,
            note: draft.note,
            loss_reason: draft.loss_reason,
            actor_id: draft.actor_id,
            created_at: draft.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn signed_delta_per_kind() {
        assert_eq!(DeltaSpec::Import { qty: 7 }.signed_delta(), 7);
        assert_eq!(DeltaSpec::Sale { qty: 7 }.signed_delta(), -7);
        assert_eq!(
            DeltaSpec::Adjustment {
                qty: 7,
                direction: AdjustmentDirection::Add
            }
            .signed_delta(),
            7
        );
        assert_eq!(
            DeltaSpec::Adjustment {
                qty: 7,
                direction: AdjustmentDirection::Reduce
            }
            .signed_delta(),
            -7
        );
        assert_eq!(
            DeltaSpec::Loss {
                qty: 7,
                reason: "spoilage".to_string()
            }
            .signed_delta(),
            -7
        );
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        assert!(DeltaSpec::Import { qty: 0 }.validate().is_err());
        assert!(DeltaSpec::Sale { qty: -4 }.validate().is_err());
        assert!(
            DeltaSpec::Adjustment {
                qty: 0,
                direction: AdjustmentDirection::Reduce
            }
            .validate()
            .is_err()
        );
        assert!(
            DeltaSpec::Loss {
                qty: -1,
                reason: "spoilage".to_string()
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn loss_requires_a_reason() {
        let err = DeltaSpec::Loss {
            qty: 3,
            reason: "  ".to_string(),
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn spec_serializes_with_kind_tag() {
        let json = serde_json::to_value(DeltaSpec::Loss {
            qty: 3,
            reason: "spoilage".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "loss");
        assert_eq!(json["reason"], "spoilage");
    }

    proptest! {
        #[test]
        fn valid_spec_has_matching_sign(qty in 1i64..1_000_000) {
            for spec in [
                DeltaSpec::Import { qty },
                DeltaSpec::Sale { qty },
                DeltaSpec::Adjustment { qty, direction: AdjustmentDirection::Add },
                DeltaSpec::Adjustment { qty, direction: AdjustmentDirection::Reduce },
                DeltaSpec::Loss { qty, reason: "damaged crate".to_string() },
            ] {
                prop_assert!(spec.validate().is_ok());
                prop_assert_eq!(spec.signed_delta().abs(), qty);
            }
        }
    }
}
