//! Branch-change enumeration along rays.
//!
//! The traversal path of a ray through a tree changes exactly where the ray
//! crosses the split plane of some node on its current path. Enumerating
//! those crossings in order gives collision detection and boundary sampling
//! their geometric backbone.

use crate::geom::{Coord, Real};
use crate::tree::Tree;

const CHANGE_BISECTION_ITERS: usize = 32;
const ON_BOUNDARY_PROBE_T: f64 = 1e8;

impl<F: Real, C: Coord<F>, T> Tree<F, C, T> {
    /// Visit the points where the ray's decision path changes branch.
    ///
    /// For each crossing, `f` receives the scale relative to the previous
    /// crossing (or the origin), the crossing point, and the unit normal of
    /// the split plane oriented toward the side the ray came from. Iteration
    /// stops when `f` returns false or no further crossing exists.
    pub fn ray_change_points(
        &self,
        mut origin: C,
        direction: C,
        mut f: impl FnMut(F, C, C) -> bool,
    ) {
        loop {
            let Some((point, normal, change_t)) = self.next_branch_change(origin, direction)
            else {
                return;
            };
            if !f(change_t, point, normal.scale(F::ONE / normal.norm())) {
                return;
            }
            origin = point;
        }
    }

    /// The first branch change along the ray, if any: `(point, unnormalized
    /// normal, scale)`.
    fn next_branch_change(&self, origin: C, direction: C) -> Option<(C, C, F)> {
        let (axis, threshold, less_than, greater_equal) = match self {
            Tree::Leaf(_) => return None,
            Tree::Branch {
                axis,
                threshold,
                less_than,
                greater_equal,
            } => (*axis, *threshold, less_than, greater_equal),
        };

        let cur_dot = axis.dot(origin);
        let child = if cur_dot >= threshold {
            greater_equal
        } else {
            less_than
        };

        let dir_dot = axis.dot(direction);
        // A ray parallel to the plane never crosses this node; only deeper
        // nodes can change the path.
        if dir_dot.abs() < axis.norm() * direction.norm() * F::from_f64(1e-8) {
            return child.next_branch_change(origin, direction);
        }

        let mut normal = axis;
        if cur_dot < threshold {
            normal = -normal;
        }

        let this_t = (threshold - cur_dot) / dir_dot;

        // Starting exactly on the plane happens routinely for trees with
        // tight bounding boxes; probe far ahead to see whether the ray
        // actually changes sides.
        if threshold == cur_dot {
            let max_t = F::from_f64(ON_BOUNDARY_PROBE_T);
            let max_dot = axis.dot(origin + direction.scale(max_t));
            if (cur_dot >= threshold) != (max_dot >= threshold) {
                let change_t = self.change_t(axis, threshold, origin, direction, this_t, max_t);
                return Some((origin + direction.scale(change_t), normal, change_t));
            }
        }

        if this_t <= F::ZERO {
            child.next_branch_change(origin, direction)
        } else {
            let child_change = child.next_branch_change(origin, direction);
            match child_change {
                Some((_, _, child_t)) if this_t > child_t => child_change,
                _ => {
                    let change_t =
                        self.change_t(axis, threshold, origin, direction, this_t, this_t + this_t);
                    Some((origin + direction.scale(change_t), normal, change_t))
                }
            }
        }
    }

    /// Locate the side flip of `axis . p >= threshold` by bisection inside
    /// `[min_t, max_t]`.
    fn change_t(&self, axis: C, threshold: F, origin: C, direction: C, min_t: F, max_t: F) -> F {
        let side = |t: F| axis.dot(origin + direction.scale(t)) < threshold;
        let orig = axis.dot(origin) < threshold;
        if side(min_t) != orig {
            return min_t;
        }
        if side(max_t) == orig {
            panic!("impossible situation encountered: collision was expected");
        }
        let half = F::from_f64(0.5);
        let (mut min_t, mut max_t) = (min_t, max_t);
        for _ in 0..CHANGE_BISECTION_ITERS {
            let mid_t = (min_t + max_t) * half;
            if side(mid_t) != orig {
                max_t = mid_t;
            } else {
                min_t = mid_t;
            }
        }
        max_t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Vec3;
    use approx::assert_relative_eq;

    fn slab_tree() -> Tree<f64, Vec3<f64>, bool> {
        // true for 1 <= x < 2.
        Tree::branch(
            Vec3::x_axis(),
            1.0,
            Tree::leaf(false),
            Tree::branch(Vec3::x_axis(), 2.0, Tree::leaf(true), Tree::leaf(false)),
        )
    }

    #[test]
    fn crossings_along_x() {
        let tree = slab_tree();
        let mut crossings = Vec::new();
        let mut total_t = 0.0;
        tree.ray_change_points(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            |t, p, n| {
                total_t += t;
                crossings.push((total_t, p, n));
                crossings.len() < 8
            },
        );

        assert!(crossings.len() >= 2);
        assert_relative_eq!(crossings[0].0, 1.0, epsilon = 1e-6);
        assert_relative_eq!(crossings[1].0, 2.0, epsilon = 1e-6);
        // Normals are unit length and face back along the ray.
        for (_, _, n) in &crossings[..2] {
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-9);
            assert!(n.x < 0.0);
        }
    }

    #[test]
    fn parallel_ray_sees_no_crossing() {
        let tree = slab_tree();
        let mut count = 0;
        tree.ray_change_points(
            Vec3::new(0.5, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            |_, _, _| {
                count += 1;
                true
            },
        );
        assert_eq!(count, 0);
    }

    #[test]
    fn on_boundary_start_crosses_once() {
        let tree = slab_tree();
        let mut crossings = Vec::new();
        tree.ray_change_points(
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            |t, p, n| {
                crossings.push((t, p, n));
                crossings.len() < 4
            },
        );
        // Starting exactly on x = 1 and heading toward -x flips that plane
        // immediately; the probe bisection resolves the crossing to within
        // 1e8 / 2^32 of the origin.
        assert!(!crossings.is_empty());
        assert!(crossings[0].0 < 0.05);
    }

    #[test]
    fn early_termination() {
        let tree = slab_tree();
        let mut count = 0;
        tree.ray_change_points(Vec3::zero(), Vec3::new(1.0, 0.0, 0.0), |_, _, _| {
            count += 1;
            false
        });
        assert_eq!(count, 1);
    }
}
