use criterion::{black_box, criterion_group, criterion_main, Criterion};
use meridian_core::timer::Timer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn bench_cascade_of_10k_timers(c: &mut Criterion) {
    c.bench_function("timer_10k_schedule_and_drive", |b| {
        b.iter(|| {
            let timer = Timer::new(0);
            let fired = Arc::new(AtomicUsize::new(0));

            for i in 0..10_000u32 {
                let fired = fired.clone();
                let period = 1 + (i % 600_000);
                timer.add(period, move |_| {
                    fired.fetch_add(1, Ordering::Relaxed);
                });
            }

            for ms in (0..600_000u64).step_by(50) {
                timer.advance(ms);
            }

            black_box(fired.load(Ordering::Relaxed));
        });
    });
}

fn bench_single_shot_add_remove(c: &mut Criterion) {
    let timer = Timer::new(0);

    c.bench_function("timer_add_remove_pair", |b| {
        b.iter(|| {
            let handle = timer.add(1_000, |_| {});
            black_box(timer.remove(handle));
        });
    });
}

criterion_group!(benches, bench_cascade_of_10k_timers, bench_single_shot_add_remove);
criterion_main!(benches);
