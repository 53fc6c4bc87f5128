//! Trees whose splits are triangle planes of an associated mesh.
//!
//! Instead of searching a fixed axis set, each node samples candidate split
//! planes from the triangles of the surface being approximated, weighted by
//! area. After a plane is drawn, every near-coplanar triangle leaves the
//! pool, so repeated draws explore distinct facets. The winning plane splits
//! the mesh exactly and the recursion continues on both halves.

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::build::adaptive_resample;
use crate::fork::ForkQueue;
use crate::geom::{Coord, Polytope, Vec3};
use crate::loss::SplitLoss;
use crate::sample::HitAndRunSampler;
use crate::tree::{partition, Tree};

use super::{split_mesh, Mesh};

/// Area-weighted sampler of distinct triangle planes.
pub struct MeshPlaneSampler {
    triangles: Vec<(Vec3<f64>, f64, f64)>, // (normal, bias, weight)
    total_weight: f64,
}

impl MeshPlaneSampler {
    pub fn new(mesh: &Mesh) -> Self {
        let mut triangles = Vec::with_capacity(mesh.len());
        let mut total_weight = 0.0;
        for t in &mesh.triangles {
            let area = t.area();
            if area == 0.0 {
                continue;
            }
            let normal = t.normal();
            let bias = normal.dot(t.vertices[0]);
            triangles.push((normal, bias, area));
            total_weight += area;
        }
        Self {
            triangles,
            total_weight,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Draw a plane `(normal, bias)` by area weight and remove every
    /// near-coplanar triangle from the pool.
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> (Vec3<f64>, f64) {
        let mut f = rng.gen::<f64>() * self.total_weight;
        let mut chosen = self.triangles.len() - 1;
        for (i, &(_, _, weight)) in self.triangles.iter().enumerate() {
            f -= weight;
            if f < 0.0 {
                chosen = i;
                break;
            }
        }
        let (normal, bias, _) = self.triangles[chosen];

        let mut i = 0;
        while i < self.triangles.len() {
            let (n, b, w) = self.triangles[i];
            if n.dot(normal).abs() > 1.0 - 1e-7 && (b - bias).abs() < 1e-7 {
                self.total_weight -= w;
                self.triangles.swap_remove(i);
            } else {
                i += 1;
            }
        }

        (normal, bias)
    }
}

/// Build a tree whose candidate splits are planes on the mesh surface.
///
/// Sampling works exactly like the adaptive builder: cells short on data are
/// topped up by hit-and-run inside the cell polytope and labeled by the
/// oracle. A node with an empty mesh, an exhausted depth budget, or no split
/// that separates its samples becomes a leaf.
#[allow(clippy::too_many_arguments)]
pub fn mesh_surface_tree<T, L, O>(
    mesh: &Mesh,
    bounds: Polytope<f64, Vec3<f64>>,
    points: Vec<Vec3<f64>>,
    labels: Vec<T>,
    oracle: &O,
    loss: &L,
    sampler: &HitAndRunSampler<f64>,
    min_samples: usize,
    concurrency: usize,
    max_depth: usize,
    max_search_splits: usize,
    rng: &mut Xoshiro256PlusPlus,
) -> Tree<f64, Vec3<f64>, T>
where
    T: Copy + Send + Sync,
    L: SplitLoss<f64, T>,
    O: Fn(Vec3<f64>) -> T + Sync,
{
    let queue = ForkQueue::new(concurrency);
    build(
        mesh,
        bounds,
        points,
        labels,
        oracle,
        loss,
        sampler,
        min_samples,
        &queue,
        max_depth,
        max_search_splits,
        rng,
    )
}

#[allow(clippy::too_many_arguments)]
fn build<T, L, O>(
    mesh: &Mesh,
    bounds: Polytope<f64, Vec3<f64>>,
    mut points: Vec<Vec3<f64>>,
    mut labels: Vec<T>,
    oracle: &O,
    loss: &L,
    sampler: &HitAndRunSampler<f64>,
    min_samples: usize,
    queue: &ForkQueue,
    max_depth: usize,
    max_search_splits: usize,
    rng: &mut Xoshiro256PlusPlus,
) -> Tree<f64, Vec3<f64>, T>
where
    T: Copy + Send + Sync,
    L: SplitLoss<f64, T>,
    O: Fn(Vec3<f64>) -> T + Sync,
{
    if max_depth == 0 || mesh.is_empty() {
        return Tree::leaf(loss.predict(&labels));
    }

    let mut plane_sampler = MeshPlaneSampler::new(mesh);
    let mut axes = Vec::new();
    let mut thresholds = Vec::new();
    while !plane_sampler.is_empty() && axes.len() < max_search_splits {
        let (normal, bias) = plane_sampler.sample(rng);
        axes.push(normal);
        thresholds.push(bias);
    }

    adaptive_resample(
        &bounds,
        &mut points,
        &mut labels,
        oracle,
        sampler,
        min_samples,
        queue,
        rng,
    );

    let candidates = queue.map_with(
        0..axes.len(),
        || (Vec::new(), Vec::new()),
        |(lt_buf, ge_buf): &mut (Vec<T>, Vec<T>), i| {
            let axis = axes[i];
            let threshold = thresholds[i];
            lt_buf.clear();
            ge_buf.clear();
            for (p, label) in points.iter().zip(labels.iter()) {
                if p.dot(axis) >= threshold {
                    ge_buf.push(*label);
                } else {
                    lt_buf.push(*label);
                }
            }
            if lt_buf.is_empty() || ge_buf.is_empty() {
                None
            } else {
                Some(loss.split_cost(lt_buf, ge_buf))
            }
        },
    );

    let mut best: Option<(f64, usize)> = None;
    for (i, candidate) in candidates.into_iter().enumerate() {
        if let Some(cost) = candidate {
            if best.map_or(true, |(l, _)| cost < l) {
                best = Some((cost, i));
            }
        }
    }
    let Some((_, best_idx)) = best else {
        return Tree::leaf(loss.predict(&labels));
    };

    let axis = axes[best_idx];
    let threshold = thresholds[best_idx];
    let (lt_mesh, ge_mesh) = split_mesh(mesh, axis, threshold);
    let lt_bounds = bounds.constrain(axis, threshold);
    let ge_bounds = bounds.constrain(-axis, -threshold);

    let mid = partition(axis, threshold, &mut points, &mut labels);
    let right_points = points.split_off(mid);
    let right_labels = labels.split_off(mid);

    let less_than = build(
        &lt_mesh,
        lt_bounds,
        points,
        labels,
        oracle,
        loss,
        sampler,
        min_samples,
        queue,
        max_depth - 1,
        max_search_splits,
        rng,
    );
    let greater_equal = build(
        &ge_mesh,
        ge_bounds,
        right_points,
        right_labels,
        oracle,
        loss,
        sampler,
        min_samples,
        queue,
        max_depth - 1,
        max_search_splits,
        rng,
    );
    Tree::branch(axis, threshold, less_than, greater_equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::EntropySplitLoss;
    use crate::mesh::Triangle;
    use rand::SeedableRng;

    fn unit_box_mesh() -> Mesh {
        // An axis-aligned box from 0.25 to 0.75 (12 triangles).
        let (lo, hi) = (0.25, 0.75);
        let mut triangles = Vec::new();
        let corners = |x: f64, y: f64, z: f64| Vec3::new(x, y, z);
        // For each axis, two faces as two triangles each.
        for (axis, flip) in [(0, false), (0, true), (1, false), (1, true), (2, false), (2, true)] {
            let w = if flip { hi } else { lo };
            let quad: [Vec3<f64>; 4] = match axis {
                0 => [
                    corners(w, lo, lo),
                    corners(w, hi, lo),
                    corners(w, hi, hi),
                    corners(w, lo, hi),
                ],
                1 => [
                    corners(lo, w, lo),
                    corners(hi, w, lo),
                    corners(hi, w, hi),
                    corners(lo, w, hi),
                ],
                _ => [
                    corners(lo, lo, w),
                    corners(hi, lo, w),
                    corners(hi, hi, w),
                    corners(lo, hi, w),
                ],
            };
            triangles.push(Triangle::new(quad[0], quad[1], quad[2]));
            triangles.push(Triangle::new(quad[0], quad[2], quad[3]));
        }
        Mesh::new(triangles)
    }

    #[test]
    fn plane_sampler_removes_coplanar_triangles() {
        let mesh = unit_box_mesh();
        let mut sampler = MeshPlaneSampler::new(&mesh);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        let mut draws = 0;
        while !sampler.is_empty() {
            sampler.sample(&mut rng);
            draws += 1;
            assert!(draws <= 6, "box has only six distinct planes");
        }
        assert_eq!(draws, 6);
    }

    #[test]
    fn surface_tree_learns_the_box() {
        let mesh = unit_box_mesh();
        let oracle = |p: Vec3<f64>| {
            p.x > 0.25 && p.x < 0.75 && p.y > 0.25 && p.y < 0.75 && p.z > 0.25 && p.z < 0.75
        };
        let bounds = Polytope::cube(Vec3::splat(0.0), Vec3::splat(1.0));
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);

        let mut points = Vec::new();
        let mut labels = Vec::new();
        let mut gen = Xoshiro256PlusPlus::seed_from_u64(4);
        for _ in 0..500 {
            let p = Vec3::new(gen.gen(), gen.gen(), gen.gen());
            points.push(p);
            labels.push(oracle(p));
        }

        let tree = mesh_surface_tree(
            &mesh,
            bounds,
            points,
            labels,
            &oracle,
            &EntropySplitLoss { min_count: 1 },
            &HitAndRunSampler::new(10),
            500,
            1,
            8,
            6,
            &mut rng,
        );

        let mut correct = 0;
        const N: usize = 2000;
        for _ in 0..N {
            let p = Vec3::new(gen.gen(), gen.gen(), gen.gen());
            if *tree.predict(p) == oracle(p) {
                correct += 1;
            }
        }
        assert!(
            correct as f64 / N as f64 > 0.95,
            "accuracy {}/{}",
            correct,
            N
        );
    }
}
