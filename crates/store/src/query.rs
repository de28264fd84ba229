//! Read-side query and pagination types for the stock ledger.

use serde::{Deserialize, Serialize};

use fishdock_core::ItemId;
use fishdock_ledger::{EntryKind, LedgerEntry, StockStatus};

/// Opaque position in the newest-first log scan.
///
/// Wraps the global commit sequence of the last entry a page returned; the
/// next page holds entries strictly older than it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogCursor(pub u64);

/// Filter + pagination for `read_log`. Newest-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    pub item_id: Option<ItemId>,
    pub kind: Option<EntryKind>,
    pub cursor: Option<LogCursor>,
    pub limit: usize,
}

impl LogQuery {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 500;

    pub fn new() -> Self {
        Self {
            item_id: None,
            kind: None,
            cursor: None,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn for_item(item_id: ItemId) -> Self {
        Self {
            item_id: Some(item_id),
            ..Self::new()
        }
    }

    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_cursor(mut self, cursor: LogCursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Effective page size: a zero limit falls back to the default, anything
    /// above the cap is clamped.
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            Self::DEFAULT_LIMIT
        } else {
            self.limit.min(Self::MAX_LIMIT)
        }
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if let Some(item_id) = self.item_id {
            if entry.item_id != item_id {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if entry.kind != kind {
                return false;
            }
        }
        if let Some(LogCursor(seq)) = self.cursor {
            if entry.seq >= seq {
                return false;
            }
        }
        true
    }
}

impl Default for LogQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// One newest-first page of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPage {
    pub entries: Vec<LedgerEntry>,
    /// Cursor for the next (older) page; `None` when the scan is exhausted.
    pub next_cursor: Option<LogCursor>,
}

/// Filter for `list_projections`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionFilter {
    pub status: Option<StockStatus>,
    pub item_ids: Option<Vec<ItemId>>,
}

impl ProjectionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: StockStatus) -> Self {
        Self {
            status: Some(status),
            item_ids: None,
        }
    }

    pub fn matches(&self, projection: &fishdock_ledger::Projection) -> bool {
        if let Some(status) = self.status {
            if projection.status != status {
                return false;
            }
        }
        if let Some(ids) = &self.item_ids {
            if !ids.contains(&projection.item_id) {
                return false;
            }
        }
        true
    }
}

/// Aggregate totals across all projection rows.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTotals {
    pub total_quantity: i64,
    /// Number of items with a projection row.
    pub distinct_item_count: u64,
}
