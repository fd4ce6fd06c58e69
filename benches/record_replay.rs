//! Benchmarks for record-replay performance

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use tempfile::TempDir;

use playback::exchange::{LiveRequest, LiveResponse};
use playback::playback::{MatcherOptions, PlaybackRequestMap};
use playback::storage::{FileStore, RecordingStore};

const FILE: &str = "e2e/bench.spec.js";
const TITLE: &str = "bench";

fn recorded_map(requests: usize) -> (PlaybackRequestMap, String) {
    let mut map = PlaybackRequestMap::new(FILE, TITLE).unwrap();
    let id = map
        .add("GET", "/api/todos/*".into(), MatcherOptions::default())
        .unwrap();

    for i in 0..requests {
        let request = LiveRequest::new("GET", format!("https://api.example.com/api/todos/{i}"), "");
        let response = LiveResponse::new(200, "OK", Some(json!({ "id": i, "title": "test" }).into()));
        map.add_response(&id, &request, response).unwrap();
    }

    (map, id)
}

fn bench_record_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_batch");

    for count in [10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| recorded_map(black_box(count)));
        });
    }

    group.finish();
}

fn bench_replay_single_request(c: &mut Criterion) {
    let (map, id) = recorded_map(100);
    let data = serde_json::to_value(map.serialize()).unwrap();
    let request = LiveRequest::new("GET", "https://api.example.com/api/todos/42", "");

    c.bench_function("replay_single_request", |b| {
        b.iter_batched(
            || PlaybackRequestMap::from_document(FILE, TITLE, data.clone()).unwrap(),
            |mut replay| {
                replay
                    .get_response(&id, black_box(&request), None)
                    .map(|r| r.status_code())
                    .unwrap()
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_store_roundtrip(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::new(temp_dir.path(), None);
    let (map, _) = recorded_map(100);
    let document = map.serialize();

    c.bench_function("store_save_load_100", |b| {
        b.iter(|| {
            store.save(FILE, TITLE, black_box(&document)).unwrap();
            store.load(FILE, TITLE).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_record_batch,
    bench_replay_single_request,
    bench_store_roundtrip
);
criterion_main!(benches);
