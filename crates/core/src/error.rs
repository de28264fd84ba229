//! Ledger error model.

use thiserror::Error;

/// Result type used across the ledger engine.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error taxonomy exposed across the API boundary.
///
/// Every `apply` call resolves to exactly the committed entry/projection pair
/// or one of these stable kinds; no half-applied state is ever observable.
///
/// - `Validation`, `NotFound` and `InsufficientStock` are terminal business
///   errors, returned synchronously and never retried by the engine.
/// - `Conflict` is a benign concurrent-version race; the engine retries it
///   internally with a fresh read and only surfaces it once attempts exhaust.
/// - `StorageUnavailable` is a transient storage failure that survived the
///   bounded backoff retries; further retry policy is the caller's decision.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A malformed request (e.g. non-positive quantity where positive is
    /// required). Rejected before touching storage.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced item is unknown to the master-data catalog or store.
    #[error("item not found")]
    NotFound,

    /// The mutation would drive the projected quantity below zero.
    /// Nothing is persisted.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// Optimistic-version race that persisted through the bounded retries,
    /// or a write the store refused as internally inconsistent.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage failed transiently and the bounded backoff retries exhausted.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn storage_unavailable(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// True for the deterministic business failures that must never be
    /// auto-retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound | Self::InsufficientStock { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_are_terminal() {
        assert!(LedgerError::validation("bad").is_terminal());
        assert!(LedgerError::not_found().is_terminal());
        assert!(
            LedgerError::InsufficientStock {
                requested: 5,
                available: 3
            }
            .is_terminal()
        );
        assert!(!LedgerError::conflict("race").is_terminal());
        assert!(!LedgerError::storage_unavailable("timeout").is_terminal());
    }
}
