//! Postgres-backed stock ledger store.
//!
//! Persists the projection table and the append-only ledger in PostgreSQL,
//! enforcing per-item serialization and optimistic versioning at the
//! database level, so the safety guarantees hold across multiple running
//! instances.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE stock_projections (
//!     item_id    UUID PRIMARY KEY,
//!     quantity   BIGINT NOT NULL CHECK (quantity >= 0),
//!     status     TEXT NOT NULL,
//!     version    BIGINT NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE stock_ledger (
//!     seq             BIGSERIAL PRIMARY KEY,
//!     entry_id        UUID NOT NULL UNIQUE,
//!     item_id         UUID NOT NULL REFERENCES stock_projections (item_id),
//!     kind            TEXT NOT NULL,
//!     quantity_change BIGINT NOT NULL,
//!     quantity_before BIGINT NOT NULL,
//!     quantity_after  BIGINT NOT NULL CHECK (quantity_after >= 0),
//!     reference_type  TEXT,
//!     reference_id    UUID,
//!     note            TEXT,
//!     loss_reason     TEXT,
//!     actor_id        UUID NOT NULL,
//!     created_at      TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! ## Error mapping
//!
//! | SQLx error | PostgreSQL code | StoreError | Scenario |
//! |------------|-----------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Concurrent append committed first |
//! | Database (check violation) | `23514` | `Conflict` | Quantity would go negative |
//! | Database (lock not available) | `55P03` | `Unavailable` | Row-lock wait exceeded the bounded timeout |
//! | Io / PoolTimedOut / PoolClosed | n/a | `Unavailable` | Transient connectivity failure |
//! | Database (other) | any other | `InvalidAppend` | Unexpected database errors |

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use fishdock_core::{ExpectedVersion, ItemId};
use fishdock_ledger::{
    EntryDraft, EntryKind, LedgerEntry, Projection, Reference, ReferenceKind, StockStatus,
};

use crate::query::{LogCursor, LogPage, LogQuery, ProjectionFilter, StockTotals};
use crate::store::{check_draft, Committed, StockStore, StoreError};

/// Bound on the row-lock wait inside an append transaction.
const LOCK_TIMEOUT: &str = "5s";

/// Postgres-backed stock ledger store.
///
/// `append` runs one transaction that takes the projection row lock
/// (`SELECT ... FOR UPDATE` with a bounded `lock_timeout`), validates the
/// optimistic version, updates the projection and inserts the ledger row.
/// The sync [`StockStore`] impl bridges onto the tokio runtime via
/// `Handle::block_on`, so trait calls must come from outside async context
/// (e.g. `spawn_blocking`).
#[derive(Debug, Clone)]
pub struct PgStockStore {
    pool: Arc<PgPool>,
}

impl PgStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self, draft), fields(item_id = %draft.item_id, entry_id = %draft.entry_id, expected = ?expected), err)]
    pub async fn append_entry(
        &self,
        draft: EntryDraft,
        expected: ExpectedVersion,
    ) -> Result<Committed, StoreError> {
        check_draft(&draft)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Bounded row-lock wait; exceeding it surfaces as 55P03.
        sqlx::query(&format!("SET LOCAL lock_timeout = '{LOCK_TIMEOUT}'"))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        let row = sqlx::query(
            r#"
            SELECT quantity, version
            FROM stock_projections
            WHERE item_id = $1
            FOR UPDATE
            "#,
        )
        .bind(draft.item_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_projection", e))?;

        let Some(row) = row else {
            return Err(StoreError::NotFound);
        };
        let quantity: i64 = row
            .try_get("quantity")
            .map_err(|e| StoreError::InvalidAppend(format!("failed to read quantity: {e}")))?;
        let version: i64 = row
            .try_get("version")
            .map_err(|e| StoreError::InvalidAppend(format!("failed to read version: {e}")))?;

        if !expected.matches(version as u64) {
            return Err(StoreError::Conflict(format!(
                "expected {expected:?}, found version {version}"
            )));
        }
        if draft.quantity_before != quantity {
            return Err(StoreError::Conflict(format!(
                "stale read: draft chains from {}, projection holds {quantity}",
                draft.quantity_before
            )));
        }

        sqlx::query(
            r#"
            UPDATE stock_projections
            SET quantity = $2, status = $3, version = version + 1, updated_at = $4
            WHERE item_id = $1
            "#,
        )
        .bind(draft.item_id.as_uuid())
        .bind(draft.quantity_after)
        .bind(draft.status_after.as_str())
        .bind(draft.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_projection", e))?;

        let seq_row = sqlx::query(
            r#"
            INSERT INTO stock_ledger (
                entry_id, item_id, kind,
                quantity_change, quantity_before, quantity_after,
                reference_type, reference_id, note, loss_reason,
                actor_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING seq
            "#,
        )
        .bind(draft.entry_id.as_uuid())
        .bind(draft.item_id.as_uuid())
        .bind(draft.kind.as_str())
        .bind(draft.quantity_change)
        .bind(draft.quantity_before)
        .bind(draft.quantity_after)
        .bind(draft.reference.map(|r| r.reference_type.as_str()))
        .bind(draft.reference.map(|r| r.reference_id))
        .bind(&draft.note)
        .bind(&draft.loss_reason)
        .bind(draft.actor_id.as_uuid())
        .bind(draft.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_entry", e))?;

        let seq: i64 = seq_row
            .try_get("seq")
            .map_err(|e| StoreError::InvalidAppend(format!("failed to read seq: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let status_after = draft.status_after;
        let updated_at = draft.created_at;
        let entry = LedgerEntry::from_draft(draft, seq as u64);
        let projection = Projection {
            item_id: entry.item_id,
            quantity: entry.quantity_after,
            status: status_after,
            version: version as u64 + 1,
            updated_at,
        };

        Ok(Committed { entry, projection })
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    pub async fn ensure_projection_row(
        &self,
        item_id: ItemId,
        initial_status: StockStatus,
    ) -> Result<Projection, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_projections (item_id, quantity, status, version, updated_at)
            VALUES ($1, 0, $2, 0, $3)
            ON CONFLICT (item_id) DO NOTHING
            "#,
        )
        .bind(item_id.as_uuid())
        .bind(initial_status.as_str())
        .bind(Utc::now())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("seed_projection", e))?;

        self.fetch_projection(item_id).await
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    pub async fn fetch_projection(&self, item_id: ItemId) -> Result<Projection, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT item_id, quantity, status, version, updated_at
            FROM stock_projections
            WHERE item_id = $1
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_projection", e))?;

        match row {
            Some(row) => projection_from_row(&row),
            None => Err(StoreError::NotFound),
        }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn fetch_projections(
        &self,
        filter: &ProjectionFilter,
    ) -> Result<Vec<Projection>, StoreError> {
        let item_ids: Option<Vec<Uuid>> = filter
            .item_ids
            .as_ref()
            .map(|ids| ids.iter().map(|id| *id.as_uuid()).collect());

        let rows = sqlx::query(
            r#"
            SELECT item_id, quantity, status, version, updated_at
            FROM stock_projections
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid[] IS NULL OR item_id = ANY($2))
            ORDER BY item_id ASC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(item_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_projections", e))?;

        rows.iter().map(projection_from_row).collect()
    }

    #[instrument(skip(self, query), err)]
    pub async fn fetch_log(&self, query: &LogQuery) -> Result<LogPage, StoreError> {
        let limit = query.effective_limit();

        // Fetch one extra row to detect whether an older page remains.
        let rows = sqlx::query(
            r#"
            SELECT seq, entry_id, item_id, kind,
                   quantity_change, quantity_before, quantity_after,
                   reference_type, reference_id, note, loss_reason,
                   actor_id, created_at
            FROM stock_ledger
            WHERE ($1::uuid IS NULL OR item_id = $1)
              AND ($2::text IS NULL OR kind = $2)
              AND ($3::bigint IS NULL OR seq < $3)
            ORDER BY seq DESC
            LIMIT $4
            "#,
        )
        .bind(query.item_id.map(|id| *id.as_uuid()))
        .bind(query.kind.map(|k| k.as_str()))
        .bind(query.cursor.map(|c| c.0 as i64))
        .bind((limit + 1) as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_log", e))?;

        let mut entries = rows
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let next_cursor = if entries.len() > limit {
            entries.truncate(limit);
            entries.last().map(|e| LogCursor(e.seq))
        } else {
            None
        };

        Ok(LogPage {
            entries,
            next_cursor,
        })
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_totals(&self) -> Result<StockTotals, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(quantity), 0)::bigint AS total_quantity,
                   COUNT(*) AS distinct_item_count
            FROM stock_projections
            "#,
        )
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_totals", e))?;

        let total_quantity: i64 = row
            .try_get("total_quantity")
            .map_err(|e| StoreError::InvalidAppend(format!("failed to read total_quantity: {e}")))?;
        let distinct_item_count: i64 = row
            .try_get("distinct_item_count")
            .map_err(|e| StoreError::InvalidAppend(format!("failed to read distinct_item_count: {e}")))?;

        Ok(StockTotals {
            total_quantity,
            distinct_item_count: distinct_item_count as u64,
        })
    }
}

fn runtime_handle() -> Result<tokio::runtime::Handle, StoreError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Unavailable(
            "PgStockStore requires a tokio runtime; call from within a runtime context".to_string(),
        )
    })
}

impl StockStore for PgStockStore {
    fn append(&self, draft: EntryDraft, expected: ExpectedVersion) -> Result<Committed, StoreError> {
        runtime_handle()?.block_on(self.append_entry(draft, expected))
    }

    fn ensure_projection(
        &self,
        item_id: ItemId,
        initial_status: StockStatus,
    ) -> Result<Projection, StoreError> {
        runtime_handle()?.block_on(self.ensure_projection_row(item_id, initial_status))
    }

    fn read_projection(&self, item_id: ItemId) -> Result<Projection, StoreError> {
        runtime_handle()?.block_on(self.fetch_projection(item_id))
    }

    fn list_projections(&self, filter: &ProjectionFilter) -> Result<Vec<Projection>, StoreError> {
        runtime_handle()?.block_on(self.fetch_projections(filter))
    }

    fn read_log(&self, query: &LogQuery) -> Result<LogPage, StoreError> {
        runtime_handle()?.block_on(self.fetch_log(query))
    }

    fn totals(&self) -> Result<StockTotals, StoreError> {
        runtime_handle()?.block_on(self.fetch_totals())
    }
}

fn projection_from_row(row: &sqlx::postgres::PgRow) -> Result<Projection, StoreError> {
    let item_id: Uuid = row
        .try_get("item_id")
        .map_err(|e| StoreError::InvalidAppend(format!("failed to read item_id: {e}")))?;
    let quantity: i64 = row
        .try_get("quantity")
        .map_err(|e| StoreError::InvalidAppend(format!("failed to read quantity: {e}")))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| StoreError::InvalidAppend(format!("failed to read status: {e}")))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| StoreError::InvalidAppend(format!("failed to read version: {e}")))?;
    let updated_at: DateTime<Utc> = row
        .try_get("updated_at")
        .map_err(|e| StoreError::InvalidAppend(format!("failed to read updated_at: {e}")))?;

    Ok(Projection {
        item_id: ItemId::from_uuid(item_id),
        quantity,
        status: parse_status(&status)?,
        version: version as u64,
        updated_at,
    })
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<LedgerEntry, StoreError> {
    let read = |col: &str, e: sqlx::Error| {
        StoreError::InvalidAppend(format!("failed to read {col}: {e}"))
    };

    let seq: i64 = row.try_get("seq").map_err(|e| read("seq", e))?;
    let entry_id: Uuid = row.try_get("entry_id").map_err(|e| read("entry_id", e))?;
    let item_id: Uuid = row.try_get("item_id").map_err(|e| read("item_id", e))?;
    let kind: String = row.try_get("kind").map_err(|e| read("kind", e))?;
    let quantity_change: i64 = row
        .try_get("quantity_change")
        .map_err(|e| read("quantity_change", e))?;
    let quantity_before: i64 = row
        .try_get("quantity_before")
        .map_err(|e| read("quantity_before", e))?;
    let quantity_after: i64 = row
        .try_get("quantity_after")
        .map_err(|e| read("quantity_after", e))?;
    let reference_type: Option<String> = row
        .try_get("reference_type")
        .map_err(|e| read("reference_type", e))?;
    let reference_id: Option<Uuid> = row
        .try_get("reference_id")
        .map_err(|e| read("reference_id", e))?;
    let note: Option<String> = row.try_get("note").map_err(|e| read("note", e))?;
    let loss_reason: Option<String> = row
        .try_get("loss_reason")
        .map_err(|e| read("loss_reason", e))?;
    let actor_id: Uuid = row.try_get("actor_id").map_err(|e| read("actor_id", e))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| read("created_at", e))?;

    let reference = match (reference_type, reference_id) {
        (Some(kind), Some(id)) => Some(Reference {
            reference_type: parse_reference_kind(&kind)?,
            reference_id: id,
        }),
        (None, None) => None,
        _ => {
            return Err(StoreError::InvalidAppend(
                "reference_type and reference_id must be set together".to_string(),
            ));
        }
    };

    Ok(LedgerEntry {
        seq: seq as u64,
        entry_id: fishdock_core::EntryId::from_uuid(entry_id),
        item_id: ItemId::from_uuid(item_id),
        kind: parse_kind(&kind)?,
        quantity_change,
        quantity_before,
        quantity_after,
        reference,
        note,
        loss_reason,
        actor_id: fishdock_core::ActorId::from_uuid(actor_id),
        created_at,
    })
}

fn parse_status(s: &str) -> Result<StockStatus, StoreError> {
    match s {
        "out_of_stock" => Ok(StockStatus::OutOfStock),
        "low_stock" => Ok(StockStatus::LowStock),
        "in_stock" => Ok(StockStatus::InStock),
        other => Err(StoreError::InvalidAppend(format!(
            "unknown stock status '{other}'"
        ))),
    }
}

fn parse_kind(s: &str) -> Result<EntryKind, StoreError> {
    match s {
        "import" => Ok(EntryKind::Import),
        "sale" => Ok(EntryKind::Sale),
        "adjustment" => Ok(EntryKind::Adjustment),
        "loss" => Ok(EntryKind::Loss),
        other => Err(StoreError::InvalidAppend(format!(
            "unknown entry kind '{other}'"
        ))),
    }
}

fn parse_reference_kind(s: &str) -> Result<ReferenceKind, StoreError> {
    match s {
        "sale_order" => Ok(ReferenceKind::SaleOrder),
        "import_order" => Ok(ReferenceKind::ImportOrder),
        other => Err(StoreError::InvalidAppend(format!(
            "unknown reference kind '{other}'"
        ))),
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation: a concurrent append committed first.
                Some("23505") => StoreError::Conflict(msg),
                // Check violation: the non-negativity constraint fired.
                Some("23514") => StoreError::Conflict(msg),
                // Row-lock wait exceeded the bounded timeout.
                Some("55P03") => StoreError::Unavailable(msg),
                _ => StoreError::InvalidAppend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        _ => StoreError::InvalidAppend(format!("sqlx error in {operation}: {err}")),
    }
}
