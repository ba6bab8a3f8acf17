// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Benches panic on failure

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use crossbeam::channel;
use znet::keys::{includes, intersect, ResourceRegistry};
use znet::{config, ResKey, Session, SubInfo};

// ============================================================================
// Matcher Benchmarks
// ============================================================================

/// Benchmark: intersect on concrete keys (fast path)
fn bench_intersect_exact(c: &mut Criterion) {
    c.bench_function("intersect_exact", |b| {
        b.iter(|| intersect(black_box("/home/kitchen/temp"), black_box("/home/kitchen/temp")))
    });
}

/// Benchmark: intersect with segment and chunk wildcards
fn bench_intersect_wildcards(c: &mut Criterion) {
    let cases = [
        ("star", "/home/*/temp", "/home/kitchen/temp"),
        ("double_star", "/home/**", "/home/floor1/kitchen/temp"),
        ("chunk", "/home/*_temp", "/home/room_temp"),
        ("both_wild", "/home/**/temp", "/*/floor1/**"),
    ];
    let mut group = c.benchmark_group("intersect_wildcards");
    for (name, a, b) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), &(a, b), |bench, (a, b)| {
            bench.iter(|| intersect(black_box(a), black_box(b)))
        });
    }
    group.finish();
}

/// Benchmark: includes on a storage-style expression
fn bench_includes(c: &mut Criterion) {
    c.bench_function("includes_double_star", |b| {
        b.iter(|| includes(black_box("/home/**"), black_box("/home/*/temp")))
    });
}

// ============================================================================
// Registry Benchmarks
// ============================================================================

/// Benchmark: resolve a numeric id with suffix (lock-free read)
fn bench_registry_resolve(c: &mut Criterion) {
    let registry = ResourceRegistry::new();
    for i in 0..256 {
        registry
            .declare(&ResKey::from(format!("/bench/{}", i)))
            .expect("declare");
    }
    let key = ResKey::rid_with_suffix(128, "/leaf");
    c.bench_function("registry_resolve_rid_suffix", |b| {
        b.iter(|| registry.resolve(black_box(&key)).expect("resolve"))
    });
}

// ============================================================================
// Write Path Benchmarks
// ============================================================================

/// Benchmark: write routed to N of 4N subscribers
fn bench_write_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_fanout");
    for subscribers in [1usize, 8, 64] {
        let session = Session::open(config::config_default()).expect("open");
        let (tx, rx) = channel::unbounded();
        let mut subs = Vec::new();
        for i in 0..subscribers {
            subs.push(
                session
                    .declare_subscriber("/fan/**", SubInfo::default(), tx.clone())
                    .expect("declare"),
            );
            for j in 0..3 {
                subs.push(
                    session
                        .declare_subscriber(
                            format!("/other/{}/{}", i, j).as_str(),
                            SubInfo::default(),
                            tx.clone(),
                        )
                        .expect("declare"),
                );
            }
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| {
                    session.write("/fan/a/b", black_box(b"payload")).expect("write");
                    while rx.try_recv().is_ok() {}
                })
            },
        );
        drop(subs);
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_intersect_exact,
    bench_intersect_wildcards,
    bench_includes,
    bench_registry_resolve,
    bench_write_fanout,
);
criterion_main!(benches);
