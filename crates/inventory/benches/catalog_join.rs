use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use holdings_core::{CatalogItemId, InventoryItemId, UserId};
use holdings_inventory::{
    CatalogItemRecord, InventoryRecord, ListQuery, RawListParams, distinct_catalog_ids,
    join_catalog,
};

/// A page of `size` records spread across `distinct` catalog items, with every
/// tenth catalog item missing from the lookup result.
fn fixture(size: usize, distinct: usize) -> (Vec<InventoryRecord>, Vec<CatalogItemRecord>) {
    let ids: Vec<CatalogItemId> = (0..distinct).map(|_| CatalogItemId::new()).collect();
    let records = (0..size)
        .map(|i| InventoryRecord {
            id: InventoryItemId::new(),
            user_id: UserId::new(1),
            catalog_item_id: ids[i % distinct],
            quantity: (i as i64 % 7) + 1,
            version: 1,
            acquired_date: Utc::now(),
            message_ids: Vec::new(),
        })
        .collect();
    let catalog = ids
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 10 != 9)
        .map(|(i, id)| CatalogItemRecord::new(*id, format!("item-{i}"), "bench"))
        .collect();
    (records, catalog)
}

fn bench_catalog_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_join");

    for page_size in [20usize, 100] {
        let (records, catalog) = fixture(page_size, page_size / 2);
        group.throughput(Throughput::Elements(page_size as u64));
        group.bench_with_input(
            BenchmarkId::new("join", page_size),
            &(records, catalog),
            |b, (records, catalog)| {
                b.iter(|| {
                    let ids = distinct_catalog_ids(black_box(records));
                    black_box(ids);
                    black_box(join_catalog(records, catalog))
                })
            },
        );
    }

    group.finish();
}

fn bench_query_parse(c: &mut Criterion) {
    let raw = RawListParams {
        user_id: Some("42".into()),
        page: Some("3".into()),
        page_size: Some("50".into()),
        sort: Some("-acquiredDate".into()),
    };
    c.bench_function("list_query_parse", |b| {
        b.iter(|| black_box(ListQuery::parse(black_box(&raw))))
    });
}

criterion_group!(benches, bench_catalog_join, bench_query_parse);
criterion_main!(benches);
