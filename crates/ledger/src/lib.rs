//! `fishdock-ledger` — pure inventory ledger domain.
//!
//! Closed tagged unions for mutation kinds, the immutable ledger entry and
//! its uncommitted draft, the current-quantity projection, the stock-status
//! classifier, and read-only item master data. No IO, no side effects.

pub mod entry;
pub mod item;
pub mod projection;
pub mod status;

pub use entry::{
    AdjustmentDirection, DeltaSpec, EntryDraft, EntryKind, LedgerEntry, Reference, ReferenceKind,
};
pub use item::{InMemoryCatalog, Item, ItemCatalog};
pub use projection::Projection;
pub use status::{classify, StockStatus};
