//! The adjustment engine: the single write path into the stock ledger.

use std::thread;

use chrono::Utc;
use tracing::{debug, error, warn};

use fishdock_core::{ActorId, EntryId, ExpectedVersion, ItemId, LedgerError, LedgerResult};
use fishdock_ledger::{classify, DeltaSpec, EntryDraft, Item, ItemCatalog, Projection, Reference};
use fishdock_notify::ChangeNotifier;
use fishdock_store::{
    Committed, LogPage, LogQuery, ProjectionFilter, StockStore, StockTotals, StoreError,
};

use crate::retry::RetryPolicy;

/// Applies inventory mutations atomically and fans out the committed result.
///
/// `apply` is the only way stock quantities change. Each call validates the
/// spec, resolves the item, reads the current projection, pre-checks the
/// stock floor, and appends entry + projection update as one atomic unit
/// under optimistic versioning. Concurrent appliers on the same item race on
/// the version; the loser re-reads and retries against the new state, so an
/// interleaving of N concurrent calls is always equivalent to some serial
/// order of the subset that succeeded.
///
/// Notification happens strictly after commit and can neither fail nor undo
/// the mutation.
#[derive(Debug)]
pub struct AdjustmentEngine<S, C> {
    store: S,
    catalog: C,
    notifier: ChangeNotifier,
    policy: RetryPolicy,
}

impl<S, C> AdjustmentEngine<S, C>
where
    S: StockStore,
    C: ItemCatalog,
{
    pub fn new(store: S, catalog: C, notifier: ChangeNotifier) -> Self {
        Self::with_policy(store, catalog, notifier, RetryPolicy::default())
    }

    pub fn with_policy(store: S, catalog: C, notifier: ChangeNotifier, policy: RetryPolicy) -> Self {
        Self {
            store,
            catalog,
            notifier,
            policy,
        }
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Apply one inventory mutation.
    pub fn apply(
        &self,
        item_id: ItemId,
        spec: DeltaSpec,
        actor_id: ActorId,
        note: Option<String>,
    ) -> LedgerResult<Committed> {
        self.apply_referenced(item_id, spec, actor_id, note, None)
    }

    /// Apply one inventory mutation linked to an originating order document.
    pub fn apply_referenced(
        &self,
        item_id: ItemId,
        spec: DeltaSpec,
        actor_id: ActorId,
        note: Option<String>,
        reference: Option<Reference>,
    ) -> LedgerResult<Committed> {
        spec.validate()?;
        let item = self.catalog.get(item_id).ok_or(LedgerError::NotFound)?;
        let delta = spec.signed_delta();

        let mut conflict_retries = 0u32;
        let mut transient_attempt = 0u32;
        loop {
            let projection = match self.ensure_projection(&item) {
                Ok(projection) => projection,
                Err(StoreError::Unavailable(msg)) => {
                    self.transient_pause(&mut transient_attempt, &msg)?;
                    continue;
                }
                Err(err) => return Err(map_store_error(err)),
            };

            let before = projection.quantity;
            let after = before.checked_add(delta).ok_or_else(|| {
                LedgerError::validation(format!("quantity overflow applying {delta} to {before}"))
            })?;
            if after < 0 {
                return Err(LedgerError::InsufficientStock {
                    requested: -delta,
                    available: before,
                });
            }

            let previous_status = classify(before, item.min_stock);
            let draft = EntryDraft {
                entry_id: EntryId::new(),
                item_id,
                kind: spec.kind(),
                quantity_change: delta,
                quantity_before: before,
                quantity_after: after,
                status_after: classify(after, item.min_stock),
                reference,
                note: note.clone(),
                loss_reason: spec.loss_reason().map(str::to_string),
                actor_id,
                created_at: Utc::now(),
            };

            match self
                .store
                .append(draft, ExpectedVersion::Exact(projection.version))
            {
                Ok(committed) => {
                    debug!(
                        item_id = %item_id,
                        seq = committed.entry.seq,
                        kind = %committed.entry.kind,
                        quantity = committed.projection.quantity,
                        status = %committed.projection.status,
                        "applied inventory mutation"
                    );
                    self.notifier.publish_commit(
                        previous_status,
                        &committed.entry,
                        &committed.projection,
                        item.min_stock,
                    );
                    return Ok(committed);
                }
                Err(StoreError::Conflict(msg)) => {
                    if conflict_retries >= self.policy.max_conflict_retries {
                        return Err(LedgerError::conflict(msg));
                    }
                    conflict_retries += 1;
                    debug!(
                        item_id = %item_id,
                        retry = conflict_retries,
                        "version conflict, re-reading projection"
                    );
                }
                Err(StoreError::Unavailable(msg)) => {
                    self.transient_pause(&mut transient_attempt, &msg)?;
                }
                Err(StoreError::InvalidAppend(msg)) => {
                    // An unchained draft is a bug in this pipeline, not an
                    // outage; refuse it without retrying.
                    error!(item_id = %item_id, %msg, "store refused an inconsistent draft");
                    return Err(LedgerError::conflict(msg));
                }
                Err(err) => return Err(map_store_error(err)),
            }
        }
    }

    /// Current projection of an item.
    pub fn read_projection(&self, item_id: ItemId) -> LedgerResult<Projection> {
        self.store.read_projection(item_id).map_err(map_store_error)
    }

    /// Projections matching the filter.
    pub fn list_projections(&self, filter: &ProjectionFilter) -> LedgerResult<Vec<Projection>> {
        self.store.list_projections(filter).map_err(map_store_error)
    }

    /// Newest-first page of the audit ledger.
    pub fn read_log(&self, query: &LogQuery) -> LedgerResult<LogPage> {
        self.store.read_log(query).map_err(map_store_error)
    }

    /// Aggregate quantity and item counts across all projections.
    pub fn totals(&self) -> LedgerResult<StockTotals> {
        self.store.totals().map_err(map_store_error)
    }

    fn ensure_projection(&self, item: &Item) -> Result<Projection, StoreError> {
        self.store
            .ensure_projection(item.id, classify(0, item.min_stock))
    }

    /// Sleep out one transient-failure backoff step, or give up once the
    /// attempt budget is spent.
    fn transient_pause(&self, attempt: &mut u32, msg: &str) -> LedgerResult<()> {
        *attempt += 1;
        if *attempt >= self.policy.transient_attempts {
            return Err(LedgerError::storage_unavailable(msg));
        }
        let pause = self.policy.backoff(*attempt - 1);
        warn!(attempt = *attempt, ?pause, "store unavailable, backing off");
        thread::sleep(pause);
        Ok(())
    }
}

fn map_store_error(err: StoreError) -> LedgerError {
    match err {
        StoreError::NotFound => LedgerError::NotFound,
        StoreError::Conflict(msg) => LedgerError::Conflict(msg),
        StoreError::Unavailable(msg) => LedgerError::StorageUnavailable(msg),
        StoreError::InvalidAppend(msg) => LedgerError::Conflict(msg),
    }
}
