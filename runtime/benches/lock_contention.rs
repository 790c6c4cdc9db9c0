//! Entity lock benchmarks
//!
//! Measures the overhead of bounded per-entity locking:
//! - Uncontended lock/unlock through `EntityTable`
//! - Sorted multi-entity acquisition (the seat-lock pattern)
//!
//! Run with: `cargo bench -p boxoffice-runtime`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use boxoffice_runtime::EntityTable;
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::time::Duration;

fn benchmark_single_lock(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_lock");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    let table: EntityTable<u32, u64> = EntityTable::new("bench", Duration::from_millis(100));
    table.insert(1, 0).expect("fresh key");

    group.bench_function("lock_increment", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut guard = table.lock(black_box(&1)).await.expect("uncontended");
            *guard += 1;
        });
    });

    group.finish();
}

fn benchmark_sorted_multi_lock(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorted_multi_lock");
    group.throughput(Throughput::Elements(4));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    let table: EntityTable<u32, bool> = EntityTable::new("bench", Duration::from_millis(100));
    for key in 0..64 {
        table.insert(key, false).expect("fresh key");
    }

    group.bench_function("four_entities", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut keys = black_box(vec![17u32, 3, 42, 8]);
            keys.sort_unstable();
            let mut guards = Vec::with_capacity(keys.len());
            for key in &keys {
                guards.push(table.lock(key).await.expect("uncontended"));
            }
            for guard in &mut guards {
                **guard = !**guard;
            }
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_single_lock, benchmark_sorted_multi_lock);
criterion_main!(benches);
