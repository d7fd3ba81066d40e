use chrono::{DateTime, Duration};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use komodo_sync::aggregator::SleepSummary;
use komodo_sync::sensors::{Sample, SleepInterval, SourceKind};
use komodo_sync::upload::UploadBatch;

fn periodic_batch() -> UploadBatch {
    let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let samples = SourceKind::POLLED
        .iter()
        .flat_map(|&kind| {
            (0..10).map(move |i| Sample::scalar(kind, 60.0 + i as f64, start - Duration::seconds(i * 5)))
        })
        .collect();
    UploadBatch::periodic(samples)
}

fn week_of_sleep() -> Vec<SleepInterval> {
    let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    (0..7 * 40)
        .map(|i| SleepInterval {
            raw_value: 2 + (i % 4),
            start: start + Duration::minutes(i * 15),
            end: start + Duration::minutes(i * 15 + 12),
        })
        .collect()
}

fn bench_encoding(c: &mut Criterion) {
    let batch = periodic_batch();
    c.bench_function("encode_periodic_batch", |b| b.iter(|| black_box(&batch).encode()));

    let intervals = week_of_sleep();
    c.bench_function("aggregate_week_of_sleep", |b| {
        b.iter(|| SleepSummary::aggregate(black_box(&intervals)).to_samples())
    });
}

criterion_group!(benches, bench_encoding);
criterion_main!(benches);
