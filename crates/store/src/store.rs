//! Stock ledger store contract.

use std::sync::Arc;

use thiserror::Error;

use fishdock_core::{ExpectedVersion, ItemId};
use fishdock_ledger::{EntryDraft, LedgerEntry, Projection, StockStatus};

use crate::query::{LogPage, LogQuery, ProjectionFilter, StockTotals};

/// The committed outcome of one atomic append: the ledger entry with its
/// assigned commit-order sequence, and the projection as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub entry: LedgerEntry,
    pub projection: Projection,
}

/// Store operation error.
///
/// These are infrastructure failures; the engine maps them onto the
/// user-facing taxonomy (`Conflict` is retried with a fresh read,
/// `Unavailable` is retried with backoff, the rest surface directly).
#[derive(Debug, Error)]
pub enum StoreError {
    /// No projection row exists for the item.
    #[error("projection not found")]
    NotFound,

    /// Optimistic version check failed, or the write would violate a row
    /// invariant a concurrent commit already claimed (benign race).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient failure (lock wait timed out, connection lost).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The draft itself is inconsistent (mismatched arithmetic, bad chain).
    #[error("invalid append: {0}")]
    InvalidAppend(String),
}

/// Append-only stock ledger with a per-item current-quantity projection.
///
/// ## Append semantics
///
/// `append` is one atomic unit: it checks the projection version against
/// `expected`, refuses a write that would leave the quantity negative,
/// assigns the entry's global commit sequence, and writes the projection row
/// and the ledger row together or not at all.
///
/// Appends for the same item are serialized against each other (no lost
/// updates); appends for distinct items proceed independently with no shared
/// lock. A caller blocked on the same item's boundary for longer than the
/// implementation's bounded timeout gets `Unavailable` instead of waiting
/// indefinitely.
///
/// ## Read semantics
///
/// The ledger is append-only and never contended on read; `read_log` pages
/// newest-first by commit sequence. Reads with no intervening writes return
/// identical results.
pub trait StockStore: Send + Sync {
    /// Atomically commit one entry and the matching projection update.
    fn append(&self, draft: EntryDraft, expected: ExpectedVersion) -> Result<Committed, StoreError>;

    /// Return the item's projection, creating the zero-quantity row on first
    /// reference.
    fn ensure_projection(
        &self,
        item_id: ItemId,
        initial_status: StockStatus,
    ) -> Result<Projection, StoreError>;

    /// Read the item's projection; `NotFound` if the item was never seeded.
    fn read_projection(&self, item_id: ItemId) -> Result<Projection, StoreError>;

    /// List projections matching the filter, ordered by item id.
    fn list_projections(&self, filter: &ProjectionFilter) -> Result<Vec<Projection>, StoreError>;

    /// Page through ledger entries newest-first.
    fn read_log(&self, query: &LogQuery) -> Result<LogPage, StoreError>;

    /// Aggregate totals across all projections.
    fn totals(&self) -> Result<StockTotals, StoreError>;
}

impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    fn append(&self, draft: EntryDraft, expected: ExpectedVersion) -> Result<Committed, StoreError> {
        (**self).append(draft, expected)
    }

    fn ensure_projection(
        &self,
        item_id: ItemId,
        initial_status: StockStatus,
    ) -> Result<Projection, StoreError> {
        (**self).ensure_projection(item_id, initial_status)
    }

    fn read_projection(&self, item_id: ItemId) -> Result<Projection, StoreError> {
        (**self).read_projection(item_id)
    }

    fn list_projections(&self, filter: &ProjectionFilter) -> Result<Vec<Projection>, StoreError> {
        (**self).list_projections(filter)
    }

    fn read_log(&self, query: &LogQuery) -> Result<LogPage, StoreError> {
        (**self).read_log(query)
    }

    fn totals(&self) -> Result<StockTotals, StoreError> {
        (**self).totals()
    }
}

/// Validate a draft's internal arithmetic before any write.
///
/// Shared by store implementations as a first line of defense against an
/// engine bug producing an unchained entry.
pub(crate) fn check_draft(draft: &EntryDraft) -> Result<(), StoreError> {
    if draft.quantity_before + draft.quantity_change != draft.quantity_after {
        return Err(StoreError::InvalidAppend(format!(
            "quantity arithmetic mismatch (before={}, change={}, after={})",
            draft.quantity_before, draft.quantity_change, draft.quantity_after
        )));
    }
    if draft.quantity_after < 0 {
        return Err(StoreError::Conflict(format!(
            "resulting quantity would be negative ({})",
            draft.quantity_after
        )));
    }
    Ok(())
}
