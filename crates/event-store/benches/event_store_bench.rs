use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{AppendOptions, EventEnvelope, EventStore, InMemoryEventStore, StreamId, Version};

fn make_event(stream: &StreamId, version: i64) -> EventEnvelope {
    EventEnvelope::builder()
        .stream(stream)
        .event_type("UsernameWasChanged")
        .version(Version::new(version))
        .payload_raw(serde_json::json!({
            "userId": stream.aggregate_id.to_string(),
            "username": format!("user-{version}")
        }))
        .build()
        .unwrap()
}

fn populated_store(rt: &tokio::runtime::Runtime, streams: usize, per_stream: i64) -> InMemoryEventStore {
    let store = InMemoryEventStore::new();
    rt.block_on(async {
        for i in 0..streams {
            let stream = StreamId::new("User", format!("user-{i}"));
            let events: Vec<EventEnvelope> =
                (1..=per_stream).map(|v| make_event(&stream, v)).collect();
            store
                .append_to_stream(&stream, events, AppendOptions::new())
                .await
                .unwrap();
        }
    });
    store
}

fn bench_append_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let stream = StreamId::new("User", common::AggregateId::new());
                store
                    .append_to_stream(&stream, vec![make_event(&stream, 1)], AppendOptions::expect_new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_append_batch_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let stream = StreamId::new("User", common::AggregateId::new());
                let events: Vec<EventEnvelope> = (1..=10).map(|v| make_event(&stream, v)).collect();
                store
                    .append_to_stream(&stream, events, AppendOptions::expect_new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_load_stream(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = populated_store(&rt, 10, 100);
    let stream = StreamId::new("User", "user-5");

    c.bench_function("event_store/load_stream_100_of_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.load_stream(&stream).await.unwrap();
            });
        });
    });
}

fn bench_load_stream_from_version(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = populated_store(&rt, 1, 100);
    let stream = StreamId::new("User", "user-0");

    c.bench_function("event_store/load_stream_from_version_50", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .load_stream_from_version(&stream, Version::new(50))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_stream_all_events(c: &mut Criterion) {
    use futures_util::StreamExt;

    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = populated_store(&rt, 10, 100);

    c.bench_function("event_store/stream_1000_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut stream = store.stream_all_events().await.unwrap();
                let mut count = 0;
                while let Some(result) = stream.next().await {
                    result.unwrap();
                    count += 1;
                }
                assert_eq!(count, 1000);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_append_single_event,
    bench_append_batch_10,
    bench_load_stream,
    bench_load_stream_from_version,
    bench_stream_all_events,
);
criterion_main!(benches);
