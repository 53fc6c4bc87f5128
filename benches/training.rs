//! Benchmarks for the two training hot paths: greedy construction and one
//! TAO pass.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use shapetree::build::greedy_tree;
use shapetree::geom::{Coord, Vec3};
use shapetree::loss::{EntropySplitLoss, EqualityLoss};
use shapetree::refine::Tao;

fn sphere_dataset(n: usize) -> (Vec<Vec3<f64>>, Vec<bool>) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(1337);
    let center = Vec3::new(0.3, 0.7, 0.5);
    let points: Vec<Vec3<f64>> = (0..n)
        .map(|_| Vec3::new(rng.gen(), rng.gen(), rng.gen()))
        .collect();
    let labels = points.iter().map(|p| p.dist(center) < 0.5).collect();
    (points, labels)
}

fn bench_greedy(c: &mut Criterion) {
    let (points, labels) = sphere_dataset(10_000);
    let axes = [Vec3::x_axis(), Vec3::y_axis(), Vec3::z_axis()];
    c.bench_function("greedy_depth6_10k", |b| {
        b.iter(|| {
            greedy_tree(
                &axes,
                &points,
                &labels,
                &EntropySplitLoss::default(),
                0,
                6,
            )
        })
    });
}

fn bench_tao(c: &mut Criterion) {
    let (points, labels) = sphere_dataset(10_000);
    let axes = [Vec3::x_axis(), Vec3::y_axis(), Vec3::z_axis()];
    let tree = Arc::new(greedy_tree(
        &axes,
        &points,
        &labels,
        &EntropySplitLoss::default(),
        0,
        6,
    ));
    let tao = Tao {
        loss: EqualityLoss,
        lr: 1e-2,
        weight_decay: 1e-3,
        momentum: 0.9,
        iters: 200,
        concurrency: 0,
        verbose: false,
    };
    c.bench_function("tao_pass_10k", |b| {
        b.iter(|| tao.optimize(&tree, &points, &labels))
    });
}

criterion_group!(benches, bench_greedy, bench_tao);
criterion_main!(benches);
