//! `fishdock-store` — the stock ledger store.
//!
//! A durable append-only ledger plus a current-quantity projection per item,
//! behind one atomic read-modify-write boundary. The in-memory realization
//! backs tests/dev; a Postgres realization is available behind the
//! `postgres` feature.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query;
pub mod store;

pub use in_memory::InMemoryStockStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStockStore;
pub use query::{LogCursor, LogPage, LogQuery, ProjectionFilter, StockTotals};
pub use store::{Committed, StockStore, StoreError};
