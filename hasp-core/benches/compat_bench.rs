use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use hasp_core::compat::ModeMatrix;
use hasp_core::resource::ResourceState;
use hasp_core::types::LockMode;

// ─── Helpers ────────────────────────────────────────────────────────────────

const ALL_MODES: [LockMode; 6] = [
    LockMode::Null,
    LockMode::ConcurrentRead,
    LockMode::ConcurrentWrite,
    LockMode::ProtectedRead,
    LockMode::ProtectedWrite,
    LockMode::Exclusive,
];

fn reader_crowd(count: usize) -> ResourceState {
    let mut state = ResourceState::new("Red.Blue.Green".parse().unwrap());
    for i in 0..count {
        let _ = state.try_acquire(&format!("session_{}", i), LockMode::ProtectedRead, 1);
    }
    state
}

// ─── Benchmarks ─────────────────────────────────────────────────────────────

fn bench_compatible_pair(c: &mut Criterion) {
    c.bench_function("mode_compatible_pair", |b| {
        b.iter(|| {
            ModeMatrix::compatible(
                black_box(LockMode::ProtectedWrite),
                black_box(LockMode::ConcurrentRead),
            )
        })
    });
}

fn bench_full_matrix_sweep(c: &mut Criterion) {
    c.bench_function("mode_matrix_sweep", |b| {
        b.iter(|| {
            let mut admitted = 0u32;
            for held in ALL_MODES {
                for requested in ALL_MODES {
                    if ModeMatrix::compatible(black_box(held), black_box(requested)) {
                        admitted += 1;
                    }
                }
            }
            black_box(admitted)
        })
    });
}

fn bench_admission_with_varying_holders(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission_holders");

    for count in [10, 100, 1000] {
        // an EX request against a PR crowd is denied without mutating,
        // so the same state serves every iteration
        let mut state = reader_crowd(count);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                state.try_acquire(black_box("newcomer"), black_box(LockMode::Exclusive), 1)
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_compatible_pair,
    bench_full_matrix_sweep,
    bench_admission_with_varying_holders,
);
criterion_main!(benches);
