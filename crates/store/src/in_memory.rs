//! In-memory stock ledger store.
//!
//! Backs tests and single-process dev deployments. Per-item serialization is
//! a mutex per projection row, so appends for distinct items never contend;
//! the safety guarantee holds within one running instance only (multi-instance
//! deployments need the versioned storage backend instead).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError};
use std::time::{Duration, Instant};

use chrono::Utc;

use fishdock_core::{ExpectedVersion, ItemId};
use fishdock_ledger::{EntryDraft, LedgerEntry, Projection, StockStatus};

use crate::query::{LogPage, LogQuery, ProjectionFilter, StockTotals};
use crate::store::{check_draft, Committed, StockStore, StoreError};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct InMemoryStockStore {
    rows: RwLock<HashMap<ItemId, Arc<Mutex<Projection>>>>,
    /// Global commit-ordered ledger; `seq` is the 1-based position here.
    log: RwLock<Vec<LedgerEntry>>,
    lock_timeout: Duration,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Bound on how long an append waits for the same item's serialization
    /// boundary before degrading to `Unavailable`.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            log: RwLock::new(Vec::new()),
            lock_timeout,
        }
    }

    fn row(&self, item_id: ItemId) -> Result<Arc<Mutex<Projection>>, StoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::Unavailable("projection map lock poisoned".to_string()))?;
        rows.get(&item_id).cloned().ok_or(StoreError::NotFound)
    }

    fn lock_row(
        row: &Mutex<Projection>,
        timeout: Duration,
    ) -> Result<MutexGuard<'_, Projection>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            match row.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => {
                    return Err(StoreError::Unavailable(
                        "projection row lock poisoned".to_string(),
                    ));
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::Unavailable(format!(
                            "timed out after {timeout:?} waiting for the item's append boundary"
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StockStore for InMemoryStockStore {
    fn append(&self, draft: EntryDraft, expected: ExpectedVersion) -> Result<Committed, StoreError> {
        let row = self.row(draft.item_id)?;
        let mut projection = Self::lock_row(&row, self.lock_timeout)?;

        if !expected.matches(projection.version) {
            return Err(StoreError::Conflict(format!(
                "expected {expected:?}, found version {}",
                projection.version
            )));
        }
        if draft.quantity_before != projection.quantity {
            return Err(StoreError::Conflict(format!(
                "stale read: draft chains from {}, projection holds {}",
                draft.quantity_before, projection.quantity
            )));
        }
        check_draft(&draft)?;

        let status_after = draft.status_after;
        let mut log = self
            .log
            .write()
            .map_err(|_| StoreError::Unavailable("ledger lock poisoned".to_string()))?;

        // Both writes happen under the row lock; the seq is assigned at the
        // last possible moment so global commit order matches it.
        let seq = log.len() as u64 + 1;
        let entry = LedgerEntry::from_draft(draft, seq);
        log.push(entry.clone());

        projection.quantity = entry.quantity_after;
        projection.status = status_after;
        projection.version += 1;
        projection.updated_at = entry.created_at;

        Ok(Committed {
            entry,
            projection: projection.clone(),
        })
    }

    fn ensure_projection(
        &self,
        item_id: ItemId,
        initial_status: StockStatus,
    ) -> Result<Projection, StoreError> {
        // Fast path: the row usually exists already, and a read lock keeps
        // concurrent appliers on other items off the map's write lock.
        if let Some(row) = {
            let rows = self
                .rows
                .read()
                .map_err(|_| StoreError::Unavailable("projection map lock poisoned".to_string()))?;
            rows.get(&item_id).cloned()
        } {
            let projection = Self::lock_row(&row, self.lock_timeout)?;
            return Ok(projection.clone());
        }

        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::Unavailable("projection map lock poisoned".to_string()))?;
        let row = rows
            .entry(item_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(Projection::seed(item_id, initial_status, Utc::now())))
            })
            .clone();
        drop(rows);

        let projection = Self::lock_row(&row, self.lock_timeout)?;
        Ok(projection.clone())
    }

    fn read_projection(&self, item_id: ItemId) -> Result<Projection, StoreError> {
        let row = self.row(item_id)?;
        let projection = Self::lock_row(&row, self.lock_timeout)?;
        Ok(projection.clone())
    }

    fn list_projections(&self, filter: &ProjectionFilter) -> Result<Vec<Projection>, StoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::Unavailable("projection map lock poisoned".to_string()))?;
        let handles: Vec<_> = rows.values().cloned().collect();
        drop(rows);

        let mut out = Vec::new();
        for row in handles {
            let projection = Self::lock_row(&row, self.lock_timeout)?;
            if filter.matches(&projection) {
                out.push(projection.clone());
            }
        }
        out.sort_by_key(|p| *p.item_id.as_uuid());
        Ok(out)
    }

    fn read_log(&self, query: &LogQuery) -> Result<LogPage, StoreError> {
        let log = self
            .log
            .read()
            .map_err(|_| StoreError::Unavailable("ledger lock poisoned".to_string()))?;

        let limit = query.effective_limit();
        let mut entries = Vec::with_capacity(limit.min(log.len()));
        let mut exhausted = true;

        for entry in log.iter().rev() {
            if !query.matches(entry) {
                continue;
            }
            if entries.len() == limit {
                exhausted = false;
                break;
            }
            entries.push(entry.clone());
        }

        let next_cursor = if exhausted {
            None
        } else {
            entries.last().map(|e| crate::query::LogCursor(e.seq))
        };

        Ok(LogPage {
            entries,
            next_cursor,
        })
    }

    fn totals(&self) -> Result<StockTotals, StoreError> {
        let projections = self.list_projections(&ProjectionFilter::all())?;
        Ok(StockTotals {
            total_quantity: projections.iter().map(|p| p.quantity).sum(),
            distinct_item_count: projections.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fishdock_core::{ActorId, EntryId};
    use fishdock_ledger::{classify, EntryKind};

    fn draft(item_id: ItemId, before: i64, change: i64, min_stock: i64) -> EntryDraft {
        let after = before + change;
        EntryDraft {
            entry_id: EntryId::new(),
            item_id,
            kind: if change >= 0 { EntryKind::Import } else { EntryKind::Sale },
            quantity_change: change,
            quantity_before: before,
            quantity_after: after,
            status_after: classify(after, min_stock),
            reference: None,
            note: None,
            loss_reason: None,
            actor_id: ActorId::new(),
            created_at: Utc::now(),
        }
    }

    fn seeded(store: &InMemoryStockStore) -> ItemId {
        let item_id = ItemId::new();
        store
            .ensure_projection(item_id, classify(0, 20))
            .unwrap();
        item_id
    }

    #[test]
    fn append_chains_quantities_and_bumps_version() {
        let store = InMemoryStockStore::new();
        let item_id = seeded(&store);

        let first = store
            .append(draft(item_id, 0, 100, 20), ExpectedVersion::Exact(0))
            .unwrap();
        assert_eq!(first.entry.seq, 1);
        assert_eq!(first.projection.quantity, 100);
        assert_eq!(first.projection.version, 1);

        let second = store
            .append(draft(item_id, 100, -30, 20), ExpectedVersion::Exact(1))
            .unwrap();
        assert_eq!(second.entry.quantity_before, 100);
        assert_eq!(second.entry.quantity_after, 70);
        assert_eq!(second.projection.version, 2);
    }

    #[test]
    fn stale_version_is_a_conflict_and_writes_nothing() {
        let store = InMemoryStockStore::new();
        let item_id = seeded(&store);
        store
            .append(draft(item_id, 0, 10, 20), ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(draft(item_id, 0, 10, 20), ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        assert_eq!(store.read_projection(item_id).unwrap().quantity, 10);
        assert_eq!(store.read_log(&LogQuery::for_item(item_id)).unwrap().entries.len(), 1);
    }

    #[test]
    fn negative_result_is_refused() {
        let store = InMemoryStockStore::new();
        let item_id = seeded(&store);

        let err = store
            .append(draft(item_id, 0, -5, 20), ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.read_projection(item_id).unwrap().quantity, 0);
    }

    #[test]
    fn unknown_item_is_not_found() {
        let store = InMemoryStockStore::new();
        assert!(matches!(
            store.read_projection(ItemId::new()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn ensure_projection_is_idempotent() {
        let store = InMemoryStockStore::new();
        let item_id = ItemId::new();

        let first = store.ensure_projection(item_id, classify(0, 5)).unwrap();
        store
            .append(draft(item_id, 0, 3, 5), ExpectedVersion::Exact(0))
            .unwrap();
        let again = store.ensure_projection(item_id, classify(0, 5)).unwrap();

        assert_eq!(first.quantity, 0);
        assert_eq!(again.quantity, 3, "existing row is returned, not reseeded");
    }

    #[test]
    fn ensure_existing_row_preserves_status_and_version() {
        let store = InMemoryStockStore::new();
        let item_id = ItemId::new();
        store.ensure_projection(item_id, classify(0, 20)).unwrap();
        store
            .append(draft(item_id, 0, 50, 20), ExpectedVersion::Exact(0))
            .unwrap();

        let again = store.ensure_projection(item_id, classify(0, 20)).unwrap();
        assert_eq!(again.quantity, 50);
        assert_eq!(again.version, 1);
        assert_eq!(again.status, classify(50, 20));
    }

    #[test]
    fn log_pages_newest_first_with_cursor() {
        let store = InMemoryStockStore::new();
        let item_id = seeded(&store);
        for i in 0..5 {
            store
                .append(draft(item_id, i, 1, 20), ExpectedVersion::Exact(i as u64))
                .unwrap();
        }

        let page = store
            .read_log(&LogQuery::for_item(item_id).with_limit(2))
            .unwrap();
        let seqs: Vec<u64> = page.entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![5, 4]);
        let cursor = page.next_cursor.expect("more pages remain");

        let rest = store
            .read_log(&LogQuery::for_item(item_id).with_cursor(cursor).with_limit(10))
            .unwrap();
        let seqs: Vec<u64> = rest.entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 2, 1]);
        assert!(rest.next_cursor.is_none());
    }

    #[test]
    fn kind_filter_narrows_the_log() {
        let store = InMemoryStockStore::new();
        let item_id = seeded(&store);
        store
            .append(draft(item_id, 0, 10, 20), ExpectedVersion::Exact(0))
            .unwrap();
        store
            .append(draft(item_id, 10, -4, 20), ExpectedVersion::Exact(1))
            .unwrap();

        let sales = store
            .read_log(&LogQuery::for_item(item_id).with_kind(EntryKind::Sale))
            .unwrap();
        assert_eq!(sales.entries.len(), 1);
        assert_eq!(sales.entries[0].quantity_change, -4);
    }

    #[test]
    fn totals_aggregate_across_items() {
        let store = InMemoryStockStore::new();
        let a = seeded(&store);
        let b = seeded(&store);
        store.append(draft(a, 0, 12, 20), ExpectedVersion::Exact(0)).unwrap();
        store.append(draft(b, 0, 30, 20), ExpectedVersion::Exact(0)).unwrap();

        let totals = store.totals().unwrap();
        assert_eq!(totals.total_quantity, 42);
        assert_eq!(totals.distinct_item_count, 2);
    }

    #[test]
    fn read_twice_with_no_writes_is_identical() {
        let store = InMemoryStockStore::new();
        let item_id = seeded(&store);
        store
            .append(draft(item_id, 0, 8, 20), ExpectedVersion::Exact(0))
            .unwrap();

        let q = LogQuery::for_item(item_id);
        assert_eq!(store.read_log(&q).unwrap(), store.read_log(&q).unwrap());
        assert_eq!(
            store.read_projection(item_id).unwrap(),
            store.read_projection(item_id).unwrap()
        );
    }
}
