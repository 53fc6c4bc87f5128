//! End-to-end: learn a shape, refine it, prune it, and round-trip it
//! through the on-disk format.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use shapetree::build::{greedy_tree, ConstantAxisSchedule};
use shapetree::decimate::decimate;
use shapetree::geom::{Coord, Vec3};
use shapetree::io::{read_bounded_solid_tree, write_bounded_solid_tree};
use shapetree::loss::{total_loss, EntropySplitLoss, EqualityLoss};
use shapetree::refine::Tao;
use shapetree::tree::BoundedSolidTree;

fn blob(p: Vec3<f64>) -> bool {
    p.dist(Vec3::new(0.2, -0.1, 0.3)) < 0.6
}

#[test]
fn learn_refine_prune_serialize() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(404);
    let points: Vec<Vec3<f64>> = (0..8000)
        .map(|_| {
            Vec3::new(
                rng.gen::<f64>() * 2.0 - 1.0,
                rng.gen::<f64>() * 2.0 - 1.0,
                rng.gen::<f64>() * 2.0 - 1.0,
            )
        })
        .collect();
    let labels: Vec<bool> = points.iter().map(|&p| blob(p)).collect();

    // Learn.
    let axes = ConstantAxisSchedule::icosphere(1);
    let tree = Arc::new(greedy_tree(
        axes.axes(),
        &points,
        &labels,
        &EntropySplitLoss { min_count: 4 },
        0,
        6,
    ));
    let greedy_loss = total_loss(&tree, &EqualityLoss, &points, &labels);

    // Refine.
    let tao = Tao {
        loss: EqualityLoss,
        lr: 1e-2,
        weight_decay: 1e-3,
        momentum: 0.9,
        iters: 200,
        concurrency: 0,
        verbose: false,
    };
    let result = tao.optimize(&tree, &points, &labels);
    assert!(result.new_loss <= result.old_loss);
    assert!(result.new_loss <= greedy_loss);
    let tree = result.tree;

    // Prune to a budget.
    let mut ps = points.clone();
    let mut ls = labels.clone();
    let target = (tree.num_leaves() / 2).max(2);
    let pruned = decimate(tree, target, &EqualityLoss, &mut ps, &mut ls, 0);
    assert!(pruned.num_leaves() <= target);

    // Round-trip the result.
    let bounded = BoundedSolidTree {
        min: Vec3::splat(-1.0),
        max: Vec3::splat(1.0),
        tree: pruned,
    };
    let mut buf = Vec::new();
    write_bounded_solid_tree(&mut buf, &bounded).expect("write");
    let parsed = read_bounded_solid_tree(&mut buf.as_slice()).expect("read");

    // The decoded tree goes through f32, so compare behavior rather than
    // structure: predictions can only differ for points that sit within
    // float error of a split plane.
    let mut disagreements = 0;
    for p in points.iter().take(2000) {
        if bounded.tree.predict(*p) != parsed.tree.predict(*p) {
            disagreements += 1;
        }
    }
    assert!(
        disagreements <= 2,
        "{} points changed sides after the round trip",
        disagreements
    );
}
