//! Benchmarks for decision consolidation and cluster extraction.
//!
//! Run with:
//! ```
//! cargo bench --bench consolidate_bench
//! ```
//!
//! Consolidation is the only pipeline step whose cost grows with the number
//! of match decisions rather than the corpus size, so it is benchmarked over
//! both decision shapes at several corpus sizes.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::time::Duration;
use xwalk_rs::consolidate::consolidate;
use xwalk_rs::dsu::DisjointSet;
use xwalk_rs::matcher::{MatchDecisions, MatchPair};
use xwalk_rs::model::{EntityLabel, SeqId};

/// Labels over a space one tenth the corpus size, so most rows share a
/// label with a handful of others.
fn random_labels(record_count: usize, seed: u64) -> MatchDecisions {
    let mut rng = StdRng::seed_from_u64(seed);
    let space = (record_count / 10).max(1) as u64;
    MatchDecisions::Labels(
        (0..record_count)
            .map(|_| EntityLabel(rng.random_range(0..space)))
            .collect(),
    )
}

/// One pair per ten rows, distinct endpoints drawn uniformly.
fn random_pairs(record_count: usize, seed: u64) -> MatchDecisions {
    let mut rng = StdRng::seed_from_u64(seed);
    MatchDecisions::Pairs(
        (0..record_count / 10)
            .map(|_| {
                let a = rng.random_range(0..record_count as u32);
                let mut b = rng.random_range(0..record_count as u32);
                while b == a {
                    b = rng.random_range(0..record_count as u32);
                }
                MatchPair::new(SeqId(a), SeqId(b))
            })
            .collect(),
    )
}

fn bench_consolidate_labels(c: &mut Criterion) {
    let mut group = c.benchmark_group("consolidate/labels");
    group.sample_size(30);
    group.warm_up_time(Duration::from_millis(500));

    for &record_count in &[1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(record_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(record_count),
            &record_count,
            |b, &count| {
                let decisions = random_labels(count, 42);
                b.iter(|| black_box(consolidate(&decisions, count).unwrap()))
            },
        );
    }

    group.finish();
}

fn bench_consolidate_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("consolidate/pairs");
    group.sample_size(30);
    group.warm_up_time(Duration::from_millis(500));

    for &record_count in &[1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(record_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(record_count),
            &record_count,
            |b, &count| {
                let decisions = random_pairs(count, 42);
                b.iter(|| black_box(consolidate(&decisions, count).unwrap()))
            },
        );
    }

    group.finish();
}

/// Union plus canonical cluster extraction, isolated from decision decoding.
fn bench_dsu_clusters(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsu/clusters");
    group.sample_size(20);

    for &record_count in &[10_000, 100_000] {
        group.throughput(Throughput::Elements(record_count as u64));
        group.bench_with_input(
            BenchmarkId::new("materialize", record_count),
            &record_count,
            |b, &count| {
                b.iter_batched(
                    || {
                        let mut dsu = DisjointSet::with_capacity(count as usize);
                        for i in 0..count {
                            dsu.add(SeqId(i));
                        }
                        // Chains of ten make path halving do real work.
                        for start in (0..count).step_by(10) {
                            for i in start + 1..(start + 10).min(count) {
                                dsu.union(SeqId(i - 1), SeqId(i));
                            }
                        }
                        dsu
                    },
                    |mut dsu| black_box(dsu.clusters()),
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(
    consolidate_benches,
    bench_consolidate_labels,
    bench_consolidate_pairs,
    bench_dsu_clusters
);

criterion_main!(consolidate_benches);
