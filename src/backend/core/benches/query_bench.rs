//! Benchmarks for the query feature builder.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use calendar_core::query::{QueryConfig, QueryFeatures, QueryParams};
use calendar_core::store::{InMemoryStore, RecordStore};
use serde_json::json;

const FULL_QUERY: &[(&str, &str)] = &[
    ("age[gte]", "18"),
    ("age[lte]", "65"),
    ("city", "Oslo"),
    ("sort", "-age,name"),
    ("fields", "name,email"),
    ("page", "2"),
    ("limit", "20"),
];

fn bench_build_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_build");
    let config = QueryConfig::default();
    group.bench_function("empty", |b| { b.iter(|| black_box(QueryFeatures::new(QueryParams::new(), &config).all().map(QueryFeatures::build))); });
    group.bench_function("full", |b| { b.iter(|| black_box(QueryFeatures::new(QueryParams::from_pairs(FULL_QUERY.iter().copied()), &config).all().map(QueryFeatures::build))); });
    group.finish();
}

fn seeded_store(rt: &tokio::runtime::Runtime, size: usize) -> InMemoryStore {
    let store = InMemoryStore::new("people");
    let cities = ["Oslo", "Bergen", "Lagos", "Lima"];
    rt.block_on(async {
        for i in 0..size {
            let record = json!({"name": format!("user{}", i), "email": format!("user{}@example.com", i), "age": (i % 80) as i64, "city": cities[i % cities.len()]});
            store.insert(record.as_object().cloned().unwrap_or_default()).await.unwrap();
        }
    });
    store
}

fn bench_execute(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let config = QueryConfig::default();
    let mut group = c.benchmark_group("query_execute_in_memory");
    for size in [100usize, 1_000, 10_000] {
        let store = seeded_store(&rt, size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &store, |b, store| {
            b.to_async(&rt).iter(|| async {
                let features = QueryFeatures::new(QueryParams::from_pairs(FULL_QUERY.iter().copied()), &config).all().unwrap();
                black_box(features.execute(store).await.unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build_request, bench_execute);
criterion_main!(benches);
