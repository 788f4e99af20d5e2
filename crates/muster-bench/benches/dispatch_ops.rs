//! Criterion benchmarks for full engine ticks and dispatch passes.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use muster_bench::{populate, reference_profile, release_all_units, stress_profile, warmed_engine};
use muster_test_utils::MockHost;

/// Ticks between mass releases of every unit, so the free pool refills.
const RELEASE_PERIOD: u64 = 64;

fn bench_ticks(c: &mut Criterion, name: &str, mut host: MockHost) {
    let mut engine = warmed_engine(&mut host);
    let mut ticks = 0u64;
    c.bench_function(name, |b| {
        b.iter(|| {
            ticks += 1;
            if ticks % RELEASE_PERIOD == 0 {
                release_all_units(&mut host);
            }
            host.advance(1);
            let report = engine.execute_tick(&mut host).unwrap();
            black_box(&report);
        });
    });
}

fn bench_tick_10k(c: &mut Criterion) {
    bench_ticks(c, "tick_10k", populate(&reference_profile(), 42));
}

fn bench_tick_60k(c: &mut Criterion) {
    bench_ticks(c, "tick_60k", populate(&stress_profile(), 42));
}

fn bench_1000_ticks_10k(c: &mut Criterion) {
    let base = populate(&reference_profile(), 42);
    c.bench_function("1000_ticks_10k", |b| {
        b.iter(|| {
            let mut host = base.clone();
            let mut engine = warmed_engine(&mut host);
            for t in 1..=1000u64 {
                if t % RELEASE_PERIOD == 0 {
                    release_all_units(&mut host);
                }
                host.advance(1);
                let report = engine.execute_tick(&mut host).unwrap();
                black_box(&report);
            }
        });
    });
}

criterion_group!(
    benches,
    bench_tick_10k,
    bench_tick_60k,
    bench_1000_ticks_10k
);
criterion_main!(benches);
