// Aggregator Benchmarks
//
// Measures the hot path of every inbound frame:
// - Frame decoding (JSON vs. raw text fallback)
// - Batch application into bounded buffers, cold and at capacity
// - Snapshot cloning and display windowing

use biogas_core::data::{AggregatorConfig, RawMessage, SensorAggregator, SensorBatch, TimeRange};
use biogas_core::testing::{batch_frame, fixed_at, fixed_now, sensor_batch};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

const PLANT_SENSORS: [&str; 6] = [
    "temperatura",
    "humedad",
    "presion",
    "ph",
    "gas_total_m3",
    "biol_total_m3",
];

fn plant_frame(samples_per_sensor: usize) -> String {
    let values: Vec<f64> = (0..samples_per_sensor).map(|i| 20.0 + i as f64 * 0.1).collect();
    let entries: Vec<(&str, &[f64])> = PLANT_SENSORS
        .iter()
        .map(|code| (*code, values.as_slice()))
        .collect();
    batch_frame(&sensor_batch(&entries))
}

/// Aggregator whose buffers are already full
fn warm_aggregator(max_data_points: usize) -> SensorAggregator {
    let mut aggregator = SensorAggregator::new(AggregatorConfig::with_max_data_points(max_data_points));
    let message = RawMessage::decode(&plant_frame(max_data_points));
    aggregator.handle_message_at(&message, fixed_now());
    aggregator
}

// ============================================================================
// DECODING
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.measurement_time(Duration::from_secs(2));

    let frame = plant_frame(1);
    group.bench_function("plant_batch", |b| {
        b.iter(|| black_box(RawMessage::decode(black_box(&frame))))
    });

    group.bench_function("text_fallback", |b| {
        b.iter(|| black_box(RawMessage::decode(black_box("heartbeat"))))
    });

    group.finish();
}

// ============================================================================
// BATCH APPLICATION
// ============================================================================

fn bench_apply_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_batch");
    group.measurement_time(Duration::from_secs(2));

    for samples in [1usize, 10, 50] {
        let message = RawMessage::decode(&plant_frame(samples));

        group.bench_with_input(BenchmarkId::new("cold", samples), &message, |b, message| {
            b.iter(|| {
                let mut aggregator = SensorAggregator::new(AggregatorConfig::default());
                black_box(aggregator.handle_message_at(message, fixed_now()))
            })
        });

        group.bench_with_input(BenchmarkId::new("at_capacity", samples), &message, |b, message| {
            let mut aggregator = warm_aggregator(50);
            let mut tick = 0;
            b.iter(|| {
                tick += 1;
                black_box(aggregator.handle_message_at(message, fixed_at(tick)))
            })
        });
    }

    let noisy = sensor_batch(&[("ph", &[7.0, 7.1, 7.2])]);
    group.bench_function("parsed_batch_only", |b| {
        let mut aggregator = warm_aggregator(50);
        b.iter(|| {
            let batch = SensorBatch::from_value(black_box(&noisy)).unwrap();
            black_box(aggregator.apply_batch_at(batch, fixed_now()))
        })
    });

    group.finish();
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    group.measurement_time(Duration::from_secs(2));

    let aggregator = warm_aggregator(50);
    group.bench_function("clone_store", |b| b.iter(|| black_box(aggregator.snapshot())));

    let store = aggregator.snapshot();
    for range in [TimeRange::FiveMinutes, TimeRange::OneHour] {
        group.bench_with_input(BenchmarkId::new("windowed", range.as_str()), &range, |b, range| {
            b.iter(|| black_box(store.windowed(*range, fixed_now())))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_apply_batch, bench_snapshot);
criterion_main!(benches);
