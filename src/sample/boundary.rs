//! Near-surface sampling of a solid tree's decision boundary.
//!
//! Two strategies: shoot random rays and keep their surface collisions
//! (exhaustive but may be slow on mostly-empty shapes), or mesh a randomly
//! rotated copy of the solid and sample its surface by area (fast, can miss
//! thin features).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{sync_channel, TrySendError};

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

use crate::build::spawn_rngs;
use crate::collide::TreeCollider;
use crate::geom::{Coord, Rotation, RotatedSolid, Vec3};
use crate::mesh::grid_mesh;
use crate::mesh::MeshPointSampler;
use crate::tree::BoundedSolidTree;

use crate::collide::TreeSolid;

/// Sample points on the decision boundary by ray casting.
///
/// Random rays are shot from random points inside the bounding box and every
/// surface collision is collected, until `num_points` points exist or
/// `max_queries` rays have been spent (0 = unlimited; beware empty shapes).
pub fn sample_decision_boundary_cast(
    tree: &BoundedSolidTree,
    num_points: usize,
    max_queries: usize,
    rng: &mut Xoshiro256PlusPlus,
) -> Vec<Vec3<f64>> {
    sample_with_rays(tree, num_points, max_queries, rng, |collider, origin, direction, emit| {
        collider.ray_collisions(origin, direction, |rc| {
            emit(origin + direction.scale(rc.scale));
        });
    })
}

/// Sample points at every branch change along random rays, plus midpoints of
/// consecutive changes (which sit strictly inside leaf cells).
pub fn sample_branch_changes(
    tree: &BoundedSolidTree,
    num_points: usize,
    max_queries: usize,
    rng: &mut Xoshiro256PlusPlus,
) -> Vec<Vec3<f64>> {
    sample_with_rays(tree, num_points, max_queries, rng, |collider, origin, direction, emit| {
        let mut last_point: Option<Vec3<f64>> = None;
        collider.tree().tree.ray_change_points(origin, direction, |_, p, _| {
            emit(p);
            if let Some(last) = last_point {
                emit(p.mid(last));
            }
            last_point = Some(p);
            true
        });
    })
}

fn sample_with_rays<F>(
    tree: &BoundedSolidTree,
    num_points: usize,
    max_queries: usize,
    rng: &mut Xoshiro256PlusPlus,
    f: F,
) -> Vec<Vec3<f64>>
where
    F: Fn(&TreeCollider, Vec3<f64>, Vec3<f64>, &mut dyn FnMut(Vec3<f64>)) + Sync,
{
    let collider = TreeCollider::new(tree.clone());
    let (min, max) = (tree.min, tree.max);
    let size = max - min;

    let remaining = AtomicI64::new(max_queries as i64);
    let (sender, receiver) = sync_channel::<Vec3<f64>>(num_points);

    let workers = rayon::current_num_threads();
    let worker_rngs = spawn_rngs(rng, workers);

    rayon::scope(|scope| {
        for mut worker_rng in worker_rngs {
            let sender = sender.clone();
            let collider = &collider;
            let f = &f;
            let remaining = &remaining;
            scope.spawn(move |_| {
                let mut done = false;
                while !done {
                    if max_queries != 0 && remaining.fetch_sub(1, Ordering::Relaxed) <= 0 {
                        return;
                    }
                    let origin = min
                        + Vec3::new(
                            worker_rng.gen::<f64>(),
                            worker_rng.gen::<f64>(),
                            worker_rng.gen::<f64>(),
                        ) * size;
                    let direction: Vec3<f64> = Coord::random_unit(&mut worker_rng);
                    f(collider, origin, direction, &mut |point| {
                        if let Err(TrySendError::Full(_)) = sender.try_send(point) {
                            done = true;
                        }
                    });
                }
            });
        }
    });
    drop(sender);

    receiver.try_iter().collect()
}

/// Sample points near the decision boundary by meshing the solid.
///
/// The solid is rotated by a random axis-angle rotation before meshing so
/// the grid never aligns with the shape, then points are drawn from the
/// de-rotated mesh by surface area. Can miss features thinner than the
/// grid.
pub fn sample_decision_boundary_mesh(
    tree: &BoundedSolidTree,
    num_points: usize,
    grid_size: usize,
    rng: &mut Xoshiro256PlusPlus,
) -> Vec<Vec3<f64>> {
    let rotation = Rotation::random(rng);
    let rotated = RotatedSolid::new(TreeSolid::new(tree.clone()), rotation);
    let mesh = grid_mesh(&rotated, grid_size);
    let mesh = mesh.transform(&rotation.inverse());
    if mesh.is_empty() || mesh.total_area() == 0.0 {
        return Vec::new();
    }

    let sampler = MeshPointSampler::new(&mesh);
    let chunk = 4096;
    let rngs = spawn_rngs(rng, num_points.div_ceil(chunk));
    let chunks: Vec<Vec<Vec3<f64>>> = rngs
        .into_par_iter()
        .enumerate()
        .map(|(i, mut r)| {
            let count = chunk.min(num_points - i * chunk);
            (0..count).map(|_| sampler.sample(&mut r)).collect()
        })
        .collect();
    chunks.into_iter().flatten().collect()
}

/// Sample points for active learning around misclassified inputs.
///
/// Each sample is a uniformly chosen misclassified point plus Gaussian noise
/// of scale `epsilon`. Returns an empty vector when nothing is
/// misclassified.
pub fn sample_near_misclassified(
    tree: &BoundedSolidTree,
    points: &[Vec3<f64>],
    labels: &[bool],
    count: usize,
    epsilon: f64,
    rng: &mut Xoshiro256PlusPlus,
) -> Vec<Vec3<f64>> {
    let bad: Vec<Vec3<f64>> = points
        .iter()
        .zip(labels.iter())
        .filter(|(p, l)| tree.tree.predict(**p) != *l)
        .map(|(p, _)| *p)
        .collect();
    if bad.is_empty() {
        return Vec::new();
    }
    (0..count)
        .map(|_| {
            let center = bad[rng.gen_range(0..bad.len())];
            center + Vec3::random_gaussian(rng).scale(epsilon)
        })
        .collect()
}
