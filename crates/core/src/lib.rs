//! `fishdock-core` — shared foundation for the inventory ledger engine.
//!
//! Strongly-typed identifiers, the error taxonomy, and the optimistic
//! versioning primitive. No infrastructure concerns.

pub mod error;
pub mod id;
pub mod version;

pub use error::{LedgerError, LedgerResult};
pub use id::{ActorId, EntryId, ItemId, ParticipantId, SubscriptionId};
pub use version::ExpectedVersion;
