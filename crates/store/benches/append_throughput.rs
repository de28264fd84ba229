use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use fishdock_core::{ActorId, EntryId, ExpectedVersion, ItemId};
use fishdock_ledger::{classify, EntryDraft, EntryKind};
use fishdock_store::{InMemoryStockStore, LogQuery, StockStore};

const MIN_STOCK: i64 = 20;

fn draft(item_id: ItemId, before: i64, change: i64) -> EntryDraft {
    let after = before + change;
    EntryDraft {
        entry_id: EntryId::new(),
        item_id,
        kind: if change >= 0 {
            EntryKind::Import
        } else {
            EntryKind::Sale
        },
        quantity_change: change,
        quantity_before: before,
        quantity_after: after,
        status_after: classify(after, MIN_STOCK),
        reference: None,
        note: None,
        loss_reason: None,
        actor_id: ActorId::new(),
        created_at: Utc::now(),
    }
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    for &n in &[100u64, 1_000] {
        group.throughput(Throughput::Elements(n));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let store = InMemoryStockStore::new();
                let item_id = ItemId::new();
                store
                    .ensure_projection(item_id, classify(0, MIN_STOCK))
                    .unwrap();
                for i in 0..n {
                    let committed = store
                        .append(draft(item_id, i as i64, 1), ExpectedVersion::Exact(i))
                        .unwrap();
                    black_box(committed.entry.seq);
                }
            });
        });
    }
    group.finish();
}

fn bench_read_log(c: &mut Criterion) {
    let store = InMemoryStockStore::new();
    let item_id = ItemId::new();
    store
        .ensure_projection(item_id, classify(0, MIN_STOCK))
        .unwrap();
    for i in 0..5_000u64 {
        store
            .append(draft(item_id, i as i64, 1), ExpectedVersion::Exact(i))
            .unwrap();
    }

    c.bench_function("read_log_page_of_50", |b| {
        b.iter(|| {
            let page = store.read_log(&LogQuery::for_item(item_id)).unwrap();
            black_box(page.entries.len());
        });
    });
}

criterion_group!(benches, bench_append, bench_read_log);
criterion_main!(benches);
