use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dotscope_core::{DotEngine, DotParams, QuadTree, QueryScratch, Rect, Segment};

fn generate_segments(n: usize, alen: i64, blen: i64) -> Vec<Segment> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .map(|i| {
            let abeg = rng.gen_range(0..alen - 10_000);
            let span = rng.gen_range(100..=10_000i64);
            let bbeg = rng.gen_range(0..blen - 10_000);
            if i % 2 == 0 {
                Segment::new(abeg, abeg + span, bbeg, bbeg + span, 90.0, i as u32)
            } else {
                Segment::new(abeg, abeg + span, bbeg + span, bbeg, 90.0, i as u32)
            }
        })
        .collect()
}

fn generate_sequence(len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..len).map(|_| rng.gen_range(0..4u8)).collect()
}

fn bench_tree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_build");
    for n in [10_000usize, 100_000] {
        let segs = generate_segments(n, 50_000_000, 50_000_000);
        group.bench_function(format!("{n}_segments"), |b| {
            b.iter_batched(
                || segs.clone(),
                |segs| {
                    let tree = QuadTree::build(segs, Rect::domain(50_000_000, 50_000_000));
                    black_box(tree)
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_viewport_query(c: &mut Criterion) {
    let segs = generate_segments(100_000, 50_000_000, 50_000_000);
    let tree = QuadTree::build(segs, Rect::domain(50_000_000, 50_000_000)).unwrap();
    let mut scratch = QueryScratch::new();

    c.bench_function("query_1pct_viewport", |b| {
        let view = Rect::new(10_000_000.5, 15_000_000.5, 10_000_000.5, 15_000_000.5);
        b.iter(|| {
            let hits = tree.query(black_box(&view), &mut scratch);
            black_box(hits.len())
        })
    });

    c.bench_function("query_full_domain", |b| {
        let view = Rect::new(0.0, 50_000_000.0, 0.0, 50_000_000.0);
        b.iter(|| {
            let hits = tree.query(black_box(&view), &mut scratch);
            black_box(hits.len())
        })
    });
}

fn bench_kmer_dots(c: &mut Criterion) {
    let aseq = generate_sequence(100_000);
    let bseq = generate_sequence(100_000);
    let mut engine = DotEngine::new(DotParams::default());

    let mut group = c.benchmark_group("kmer_dots_100kb");
    for k in [8usize, 12, 16] {
        group.bench_function(format!("k_{k}"), |b| {
            b.iter(|| {
                let dots = engine.dots(black_box(&aseq), black_box(&bseq), k).unwrap();
                black_box(dots.num_matches())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tree_build, bench_viewport_query, bench_kmer_dots);
criterion_main!(benches);
