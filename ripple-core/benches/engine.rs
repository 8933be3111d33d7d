//! Benchmarks for ripple-core
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::reactive::{EffectOptions, Object, Runtime, Scheduler, Value};

// =============================================================================
// OBJECT BENCHMARKS
// =============================================================================

fn bench_untracked_get(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = runtime.reactive(Object::new().with("count", 42));
    c.bench_function("untracked_get", |b| b.iter(|| black_box(state.get("count"))));
}

fn bench_set_without_readers(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = runtime.reactive(Object::new().with("count", 0));
    c.bench_function("set_without_readers", |b| {
        b.iter(|| state.set("count", black_box(42)))
    });
}

// =============================================================================
// EFFECT BENCHMARKS
// =============================================================================

fn bench_effect_trigger(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = runtime.reactive(Object::new().with("count", 0));
    let s = state.clone();
    let _effect = runtime.effect(move || black_box(s.get("count")));

    let mut i = 0i64;
    c.bench_function("effect_trigger", |b| {
        b.iter(|| {
            i += 1;
            state.set("count", i)
        })
    });
}

fn bench_many_effects(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_effects");

    for count in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("trigger", count), &count, |b, &count| {
            let runtime = Runtime::new();
            let state = runtime.reactive(Object::new().with("count", 0));
            let _effects: Vec<_> = (0..count)
                .map(|_| {
                    let s = state.clone();
                    runtime.effect(move || black_box(s.get("count")))
                })
                .collect();

            let mut i = 0i64;
            b.iter(|| {
                i += 1;
                state.set("count", i)
            });
        });
    }

    group.finish();
}

fn bench_queued_writes(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = runtime.reactive(Object::new().with("count", 0));
    let s = state.clone();
    let _effect = runtime.effect_with(
        move || black_box(s.get("count")),
        EffectOptions::scheduler(Scheduler::Queue),
    );

    c.bench_function("queued_writes_then_drain", |b| {
        b.iter(|| {
            for i in 0..10i64 {
                let _ = state.set("count", i);
            }
            runtime.drain()
        })
    });
}

// =============================================================================
// COMPUTED BENCHMARKS
// =============================================================================

fn bench_computed_cached(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = runtime.reactive(Object::new().with("count", 42));
    let s = state.clone();
    let doubled = runtime.computed(move || s.get("count").as_i64().unwrap_or(0) * 2);
    let _ = doubled.get();

    c.bench_function("computed_get_cached", |b| b.iter(|| black_box(doubled.get())));
}

fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");

    for depth in [1, 10, 50] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let runtime = Runtime::new();
            let state = runtime.reactive(Object::new().with("count", 0));
            let s = state.clone();
            let mut last = runtime.computed(move || s.get("count").as_i64().unwrap_or(0));
            for _ in 0..depth {
                let prev = last.clone();
                last = runtime.computed(move || prev.get() + 1);
            }

            let mut i = 0i64;
            b.iter(|| {
                i += 1;
                let _ = state.set("count", Value::from(i));
                black_box(last.get())
            });
        });
    }

    group.finish();
}

criterion_group!(objects, bench_untracked_get, bench_set_without_readers);
criterion_group!(effects, bench_effect_trigger, bench_many_effects, bench_queued_writes);
criterion_group!(computed, bench_computed_cached, bench_computed_chain);
criterion_main!(objects, effects, computed);
