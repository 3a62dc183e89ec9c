use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::json;
use tokio::runtime::Runtime;

use folio_core::{ExpectedVersion, Lease};
use folio_events::{Condition, EventMetadata, Message, Projection, ProjectionQuery};
use folio_infra::event_store::{AllQuery, EventStore, InMemoryEventStore};
use folio_infra::projector_store::{InMemoryProjectorStore, ProjectorStore};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn messages(size: usize) -> Vec<Message> {
    (0..size)
        .map(|i| Message::with_data("Deposited", json!({ "amount": i })))
        .collect()
}

/// Log of `streams × per_stream` events.
fn seeded_store(rt: &Runtime, streams: usize, per_stream: usize) -> InMemoryEventStore {
    let store = InMemoryEventStore::new();
    rt.block_on(async {
        for s in 0..streams {
            store
                .commit(
                    &format!("account-{s}"),
                    messages(per_stream),
                    EventMetadata::for_command("Seed", None),
                    ExpectedVersion::Any,
                )
                .await
                .unwrap();
        }
    });
    store
}

fn bench_commit_throughput(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("commit_throughput");

    for batch_size in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_commit", batch_size),
            batch_size,
            |b, &size| {
                let store = InMemoryEventStore::new();
                b.iter(|| {
                    black_box(
                        rt.block_on(store.commit(
                            "account-bench",
                            messages(size),
                            EventMetadata::default(),
                            ExpectedVersion::Any,
                        ))
                        .unwrap(),
                    );
                });
            },
        );
    }

    group.finish();
}

fn bench_query_scan(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("query_scan");

    for log_size in [1_000usize, 10_000].iter() {
        let store = seeded_store(&rt, 100, log_size / 100);
        group.throughput(Throughput::Elements(*log_size as u64));

        group.bench_with_input(BenchmarkId::new("single_stream", log_size), log_size, |b, _| {
            let query = AllQuery::new().stream("account-42");
            b.iter(|| black_box(rt.block_on(store.read(&query)).unwrap().len()));
        });

        group.bench_with_input(BenchmarkId::new("read_all", log_size), log_size, |b, _| {
            let query = AllQuery::new();
            b.iter(|| {
                let mut seen = 0usize;
                rt.block_on(store.query(&mut |_| seen += 1, &query)).unwrap();
                black_box(seen)
            });
        });
    }

    group.finish();
}

fn bench_poll_ack_cycle(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("poll_ack_cycle");
    let limit = 100;
    group.throughput(Throughput::Elements(limit as u64));

    group.bench_function("poll_then_ack_batch", |b| {
        let store = seeded_store(&rt, 10, 1_000);
        let names = vec!["Deposited".to_string()];
        let mut round = 0usize;
        b.iter(|| {
            let consumer = format!("bench-{round}");
            rt.block_on(async {
                let lease = Lease::generate();
                let mut last = None;
                store
                    .poll(
                        &consumer,
                        &names,
                        limit,
                        &lease,
                        std::time::Duration::from_secs(5),
                        &mut |e| last = Some(e.id),
                    )
                    .await
                    .unwrap();
                match last {
                    Some(id) => black_box(store.ack(&consumer, &lease, id).await.unwrap()),
                    // Log exhausted: continue with a fresh consumer.
                    None => {
                        round += 1;
                        false
                    }
                }
            })
        });
    });

    group.finish();
}

fn bench_projection_commit(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("projection_commit");

    group.bench_function("upsert_by_id", |b| {
        let store = InMemoryProjectorStore::new();
        let mut watermark = 0i64;
        b.iter(|| {
            let id = format!("account-{}", watermark % 1_000);
            let projection = Projection::new().upsert(
                json!({ "id": id }).as_object().cloned().unwrap_or_default(),
                json!({ "balance": watermark }).as_object().cloned().unwrap_or_default(),
            );
            black_box(rt.block_on(store.commit(&projection, watermark)).unwrap());
            watermark += 1;
        });
    });

    group.bench_function("query_gte", |b| {
        let store = InMemoryProjectorStore::new();
        rt.block_on(async {
            for i in 0..1_000i64 {
                let projection = Projection::new().upsert(
                    json!({ "id": format!("account-{i}") }).as_object().cloned().unwrap_or_default(),
                    json!({ "balance": i }).as_object().cloned().unwrap_or_default(),
                );
                store.commit(&projection, i).await.unwrap();
            }
        });
        let query = ProjectionQuery::new()
            .filter("balance", Condition::gte(500))
            .limit(50);
        b.iter(|| black_box(rt.block_on(store.query(&query, &mut |_| {})).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_commit_throughput,
    bench_query_scan,
    bench_poll_ack_cycle,
    bench_projection_commit
);
criterion_main!(benches);
