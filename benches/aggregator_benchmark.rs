//! Aggregator performance benchmarks.

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use logamizer::aggregator::Aggregator;
use logamizer::models::NormalizedEvent;

fn sample_event(base: DateTime<Utc>, index: usize) -> NormalizedEvent {
    NormalizedEvent {
        timestamp: base + Duration::seconds(index as i64),
        ip: format!("10.0.{}.{}", (index / 255) % 255, index % 255),
        method: "GET".to_string(),
        path: format!("/api/resource/{}", index % 50),
        status: [200, 200, 200, 404, 500][index % 5],
        bytes_sent: 512 + (index % 2048) as u64,
        referer: None,
        user_agent: Some(format!("agent-{}", index % 7)),
        user: None,
        protocol: "HTTP/1.1".to_string(),
        line_number: index as u64 + 1,
        raw: format!("benchmark line {index}"),
    }
}

fn bench_observe_single_event(c: &mut Criterion) {
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let event = sample_event(base, 1);

    c.bench_function("aggregator_observe_one", |b| {
        b.iter(|| {
            let mut aggregator = Aggregator::new("bench-site");
            aggregator.observe(black_box(&event));
            black_box(aggregator.into_buckets())
        })
    });
}

fn bench_run_10k_events_single_hour(c: &mut Criterion) {
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let events: Vec<NormalizedEvent> = (0..10_000)
        .map(|i| NormalizedEvent { timestamp: base, ..sample_event(base, i) })
        .collect();

    c.bench_function("aggregator_run_10k_single_hour", |b| {
        b.iter(|| {
            let mut aggregator = Aggregator::new("bench-site");
            aggregator.run(black_box(&events), |_| {});
            black_box(aggregator.into_buckets())
        })
    });
}

fn bench_run_10k_events_spread_across_hours(c: &mut Criterion) {
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let events: Vec<NormalizedEvent> = (0..10_000)
        .map(|i| NormalizedEvent {
            timestamp: base + Duration::minutes(i as i64 * 5),
            ..sample_event(base, i)
        })
        .collect();

    c.bench_function("aggregator_run_10k_across_hours", |b| {
        b.iter(|| {
            let mut aggregator = Aggregator::new("bench-site");
            aggregator.run(black_box(&events), |_| {});
            black_box(aggregator.into_buckets())
        })
    });
}

fn bench_topk_merge(c: &mut Criterion) {
    use logamizer::models::TopK;

    let mut a = TopK::new();
    let mut b = TopK::new();
    for i in 0..200 {
        a.observe_n(&format!("/path/{i}"), (i + 1) as u64);
        b.observe_n(&format!("/path/{}", i + 100), (i + 1) as u64);
    }

    c.bench_function("topk_merge_200_each", |bench| {
        bench.iter(|| {
            let mut merged = black_box(a.clone());
            merged.merge(black_box(&b));
            black_box(merged.top(10))
        })
    });
}

criterion_group!(
    benches,
    bench_observe_single_event,
    bench_run_10k_events_single_hour,
    bench_run_10k_events_spread_across_hours,
    bench_topk_merge,
);
criterion_main!(benches);
