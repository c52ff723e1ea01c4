use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use hasp_core::resource::ResourceState;
use hasp_core::types::LockMode;

// ─── Helpers ────────────────────────────────────────────────────────────────

fn fresh(name: &str) -> ResourceState {
    ResourceState::new(name.parse().unwrap())
}

// ─── Benchmarks ─────────────────────────────────────────────────────────────

fn bench_lock_unlock_cycle(c: &mut Criterion) {
    c.bench_function("lock_unlock_cycle", |b| {
        let mut state = fresh("Red.Blue.Green");
        b.iter(|| {
            let _ = state.try_acquire(black_box("s1"), black_box(LockMode::Exclusive), 1);
            black_box(state.release("s1", false).released)
        })
    });
}

fn bench_reader_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("grant_throughput");

    for count in [10, 50, 100] {
        group.bench_with_input(BenchmarkId::new("readers", count), &count, |b, &count| {
            b.iter(|| {
                let mut state = fresh("doc");

                // Grant the whole crowd, then drain it again
                for i in 0..count {
                    let _ = state.try_acquire(
                        &format!("reader_{}", i),
                        LockMode::ProtectedRead,
                        1,
                    );
                }
                for i in 0..count {
                    state.release(&format!("reader_{}", i), false);
                }

                black_box(state.is_idle())
            })
        });
    }

    group.finish();
}

fn bench_sequence_churn(c: &mut Criterion) {
    c.bench_function("sequence_rollback_churn", |b| {
        let mut state = fresh("_S_batch[8]");
        b.iter(|| {
            // every element is rolled back, so the pool recycles forever
            for i in 0..8 {
                let _ = state.try_acquire(&format!("s{}", i), LockMode::Exclusive, 1);
            }
            for i in 0..8 {
                state.release(&format!("s{}", i), true);
            }
            black_box(state.is_idle())
        })
    });
}

fn bench_queue_sweep(c: &mut Criterion) {
    c.bench_function("sweep_1000_waiters", |b| {
        b.iter(|| {
            let mut state = fresh("cache");
            let _ = state.try_acquire("writer", LockMode::Exclusive, 1);

            for i in 0..1000 {
                state.enqueue(&format!("reader_{}", i), LockMode::ProtectedRead, 1);
            }

            // the release grants the entire compatible batch
            black_box(state.release("writer", false).granted.len())
        })
    });
}

criterion_group!(
    benches,
    bench_lock_unlock_cycle,
    bench_reader_throughput,
    bench_sequence_churn,
    bench_queue_sweep,
);
criterion_main!(benches);
