//! `fishdock-engine` — the adjustment engine.
//!
//! Validates and applies one inventory mutation atomically against the
//! stock ledger store, then hands the committed result to the change
//! notifier. The engine is the only writer of projections; callers on
//! distinct items run fully in parallel, callers on the same item are
//! serialized by the store's append boundary.

pub mod engine;
pub mod retry;

pub use engine::AdjustmentEngine;
pub use retry::RetryPolicy;
