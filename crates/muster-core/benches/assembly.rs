//! Assembly and dispatch benchmarks for muster-core.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use muster_core::{EventBus, Fragment, QueryOptions, ResultAccumulator};
use muster_protocol::GatewayEvent;

/// Merge windows of 100 in reverse arrival order, then finalize.
fn bench_merge_finalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_finalize");

    for total in [1_000u32, 10_000, 100_000] {
        let fragments: Vec<Fragment<u64>> = (0..total)
            .step_by(100)
            .rev()
            .map(|start| Fragment::new(start, (u64::from(start)..u64::from(start) + 100).collect()))
            .collect();

        group.throughput(Throughput::Elements(u64::from(total)));
        group.bench_with_input(BenchmarkId::from_parameter(total), &fragments, |b, fragments| {
            b.iter(|| {
                let mut acc = ResultAccumulator::new();
                for fragment in fragments.iter().cloned() {
                    acc.merge(fragment);
                }
                let options = QueryOptions::new();
                assert!(acc.is_complete(total, &options));
                black_box(acc.finalize(&options))
            })
        });
    }

    group.finish();
}

/// Dispatch one event to many subscribers.
fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for subscribers in [1usize, 16, 256] {
        let bus = EventBus::new();
        let _subscriptions: Vec<_> = (0..subscribers)
            .map(|_| {
                bus.subscribe(|event| {
                    black_box(event);
                })
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &bus,
            |b, bus| b.iter(|| bus.dispatch(black_box(&GatewayEvent::HeartbeatAck))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_merge_finalize, bench_dispatch);
criterion_main!(benches);
