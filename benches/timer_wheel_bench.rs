//! Timer wheel scheduling and rendezvous throughput benchmarks.

use cml::config::WheelConfig;
use cml::wheel::TimingWheel;
use cml::{always, choose, sync, Chan};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn benchmark_schedule(c: &mut Criterion) {
    let wheel = TimingWheel::new_paused(WheelConfig::default()).unwrap();
    c.bench_function("schedule_one_shot", |b| {
        let mut ms = 0u64;
        b.iter(|| {
            ms = ms.wrapping_add(1);
            let id = wheel
                .schedule(Duration::from_millis(1 + ms % 500), || {})
                .unwrap();
            black_box(id);
        });
    });
}

fn benchmark_schedule_and_cancel(c: &mut Criterion) {
    let wheel = TimingWheel::new_paused(WheelConfig::default()).unwrap();
    c.bench_function("schedule_then_cancel", |b| {
        b.iter(|| {
            let id = wheel.schedule(Duration::from_millis(100), || {}).unwrap();
            black_box(wheel.cancel(id));
        });
    });
}

fn benchmark_advance_with_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("advance_with_armed_timers");
    for armed in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(armed), &armed, |b, &armed| {
            b.iter_batched(
                || {
                    let wheel = TimingWheel::new_paused(WheelConfig::default()).unwrap();
                    let fired = Arc::new(AtomicUsize::new(0));
                    for i in 0..armed {
                        let counter = fired.clone();
                        wheel
                            .schedule(Duration::from_millis(1 + (i % 900) as u64), move || {
                                counter.fetch_add(1, Ordering::Relaxed);
                            })
                            .unwrap();
                    }
                    wheel
                },
                |wheel| {
                    wheel.advance_to(1_000);
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn benchmark_rendezvous(c: &mut Criterion) {
    let ch: Arc<Chan<u64>> = Chan::new();
    c.bench_function("poll_recv_on_empty_channel", |b| {
        b.iter(|| black_box(cml::poll(&ch.recv_evt())));
    });
}

fn benchmark_choose_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("choose_fanout");
    for width in [2usize, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.iter(|| {
                let e = choose((0..width as i32).map(always).collect());
                black_box(sync(&e));
            });
        });
    }
    group.finish();
}

criterion_group! {
    name = wheel_benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(50);
    targets = benchmark_schedule,
              benchmark_schedule_and_cancel,
              benchmark_advance_with_load,
              benchmark_rendezvous,
              benchmark_choose_fanout
}

criterion_main!(wheel_benches);
