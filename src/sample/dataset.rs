//! Labeled dataset sampling from containment oracles.

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::build::spawn_rngs;
use crate::fork::ForkQueue;
use crate::geom::{Coord, Solid, Vec3};

const CHUNK: usize = 4096;

/// Uniform points in the solid's bounding box, labeled by containment.
pub fn solid_dataset<S: Solid>(
    solid: &S,
    num_points: usize,
    queue: &ForkQueue,
    rng: &mut Xoshiro256PlusPlus,
) -> (Vec<Vec3<f64>>, Vec<bool>) {
    solid_dataset_in_bounds(solid, solid.min(), solid.max(), num_points, queue, rng)
}

/// Uniform points in an explicit box, labeled by containment.
pub fn solid_dataset_in_bounds<S: Solid>(
    solid: &S,
    min: Vec3<f64>,
    max: Vec3<f64>,
    num_points: usize,
    queue: &ForkQueue,
    rng: &mut Xoshiro256PlusPlus,
) -> (Vec<Vec3<f64>>, Vec<bool>) {
    let size = max - min;
    let rngs = spawn_rngs(rng, num_points.div_ceil(CHUNK));
    let chunks: Vec<Vec<(Vec3<f64>, bool)>> = queue.map(
        rngs.into_iter().enumerate().collect::<Vec<_>>(),
        |(i, mut r)| {
            let count = CHUNK.min(num_points - i * CHUNK);
            (0..count)
                .map(|_| {
                    let point =
                        min + Vec3::new(r.gen::<f64>(), r.gen::<f64>(), r.gen::<f64>()) * size;
                    (point, solid.contains(point))
                })
                .collect()
        },
    );

    let mut points = Vec::with_capacity(num_points);
    let mut labels = Vec::with_capacity(num_points);
    for chunk in chunks {
        for (p, l) in chunk {
            points.push(p);
            labels.push(l);
        }
    }
    (points, labels)
}

/// The solid's bounds, expanded by 10% of the diagonal on every side.
pub fn padded_bounds<S: Solid>(solid: &S) -> (Vec3<f64>, Vec3<f64>) {
    let (min, max) = (solid.min(), solid.max());
    let pad = min.dist(max) * 0.1;
    (min.add_scalar(-pad), max.add_scalar(pad))
}
