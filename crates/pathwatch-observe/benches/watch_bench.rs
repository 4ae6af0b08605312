//! Benchmarks for key observation and key-path watches.
//!
//! Run with: cargo bench -p pathwatch-observe --bench watch_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pathwatch_core::{Array, Object, Value, run_microtasks};
use pathwatch_observe::{
    ArrayMutations, Callback, WatchCallback, assign, observe, refresh, unwatch, watch,
};
use std::hint::black_box;

// =============================================================================
// Helpers
// =============================================================================

/// `{k0: {k1: {... {leaf: 0}}}}` with `depth` intermediate objects.
fn nested(depth: usize) -> (Value, String) {
    let mut value = Value::from(Object::new().with("leaf", 0));
    let mut keys = vec!["leaf".to_string()];
    for level in (0..depth).rev() {
        let key = format!("k{level}");
        value = Value::from(Object::new().with(key.clone(), value));
        keys.insert(0, key);
    }
    (value, keys.join("."))
}

// =============================================================================
// Key observation
// =============================================================================

fn bench_assign(c: &mut Criterion) {
    let mut group = c.benchmark_group("observe/assign");

    group.bench_function("unobserved", |b| {
        let target = Value::from(Object::new().with("x", 0));
        let mut n = 0;
        b.iter(|| {
            n += 1;
            assign(black_box(&target), "x", n);
        })
    });

    for callbacks in [1usize, 8, 64] {
        group.bench_with_input(
            BenchmarkId::new("observed", callbacks),
            &callbacks,
            |b, &callbacks| {
                let target = Value::from(Object::new().with("x", 0));
                let handles: Vec<Callback> = (0..callbacks)
                    .map(|_| Callback::new(|change| {
                        black_box(change.key);
                    }))
                    .collect();
                for handle in &handles {
                    observe(&target, "x", handle);
                }
                let mut n = 0;
                b.iter(|| {
                    n += 1;
                    assign(&target, "x", n);
                })
            },
        );
    }

    group.finish();
}

fn bench_dirty_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("observe/dirty_check");

    for tracked in [10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(tracked as u64));
        group.bench_with_input(BenchmarkId::new("pass", tracked), &tracked, |b, &tracked| {
            let callback = Callback::new(|_| {});
            let objects: Vec<Value> = (0..tracked)
                .map(|i| Value::from(Object::new().with_getter("c", move |_| Value::from(i))))
                .collect();
            for object in &objects {
                observe(object, "c", &callback);
            }
            run_microtasks();
            b.iter(|| {
                refresh();
                black_box(run_microtasks());
            })
        });
    }

    group.finish();
}

// =============================================================================
// Key-path watches
// =============================================================================

fn bench_path_watch(c: &mut Criterion) {
    let mut group = c.benchmark_group("watch/path");

    for depth in [1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("watch_unwatch", depth),
            &depth,
            |b, &depth| {
                let (root, path) = nested(depth);
                let callback = WatchCallback::new(|_, _| {});
                b.iter(|| {
                    watch(&root, &path, &callback);
                    unwatch(&root, &path, &callback);
                })
            },
        );

        group.bench_with_input(BenchmarkId::new("leaf_assign", depth), &depth, |b, &depth| {
            let (root, path) = nested(depth);
            let callback = WatchCallback::new(|new, _| {
                black_box(new);
            });
            watch(&root, &path, &callback);
            let mut parent = root.clone();
            for key in path.split('.').take(depth) {
                parent = parent.get(key);
            }
            let mut n = 0;
            b.iter(|| {
                n += 1;
                assign(&parent, "leaf", n);
            })
        });
    }

    group.bench_function("list_push_100", |b| {
        let callback = WatchCallback::new(|_, _| {});
        b.iter(|| {
            let list = Array::new();
            let root = Value::from(Object::new().with("list", list.clone()));
            watch(&root, "list", &callback);
            for i in 0..100 {
                list.push(i);
            }
            unwatch(&root, "list", &callback);
        })
    });

    group.finish();
}

criterion_group!(benches, bench_assign, bench_dirty_check, bench_path_watch);
criterion_main!(benches);
