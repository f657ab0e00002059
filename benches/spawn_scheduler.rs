//! Benchmarks for schedule generation and timer processing.
//!
//! Run with: cargo bench --bench spawn_scheduler

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use whack_sync::{
    BoardDimensions, ScheduleConfig, SessionState, SimTime, SlotGrid, SpawnScheduler,
};

fn fresh(total: u32) -> (SpawnScheduler, SessionState) {
    let config = ScheduleConfig {
        total_targets: total,
        ..ScheduleConfig::deterministic(7)
    };
    let state = SessionState::new(total, SlotGrid::build(16, BoardDimensions::default()));
    (SpawnScheduler::new(&config), state)
}

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("SpawnScheduler::schedule");
    for total in [15u32, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(total), &total, |b, &total| {
            b.iter(|| {
                let (mut scheduler, mut state) = fresh(total);
                black_box(scheduler.schedule(SimTime::ZERO, &mut state))
            });
        });
    }
    group.finish();
}

fn bench_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("SpawnScheduler::advance");
    for total in [15u32, 100] {
        group.bench_with_input(BenchmarkId::new("whole_horizon", total), &total, |b, &total| {
            b.iter(|| {
                let (mut scheduler, mut state) = fresh(total);
                scheduler.schedule(SimTime::ZERO, &mut state);
                let mut fired = 0;
                for step in 0..=600u64 {
                    fired += scheduler
                        .advance(SimTime::from_millis(step * 100), &mut state)
                        .len();
                }
                black_box(fired)
            });
        });
    }
    group.finish();
}

fn bench_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("SlotGrid");
    group.bench_function("build_16", |b| {
        b.iter(|| SlotGrid::build(black_box(16), BoardDimensions::default()));
    });
    group.bench_function("build_256", |b| {
        b.iter(|| SlotGrid::build(black_box(256), BoardDimensions::default()));
    });
    group.finish();
}

criterion_group!(benches, bench_schedule, bench_advance, bench_grid);
criterion_main!(benches);
