//! Collision queries against bounded solid trees.

use std::sync::{Arc, RwLock};

use rayon::prelude::*;

use crate::geom::{Coord, Polytope, Solid, Vec3};
use crate::mesh::{convex_polytope_mesh, MeshCollider};
use crate::tree::{BoundedSolidTree, SolidTree, Tree};

use super::{Collider3, RayCollision};

/// A bounded solid tree viewed as a containment oracle.
pub struct TreeSolid {
    tree: BoundedSolidTree,
}

impl TreeSolid {
    pub fn new(tree: BoundedSolidTree) -> Self {
        Self { tree }
    }
}

impl Solid for TreeSolid {
    fn min(&self) -> Vec3<f64> {
        self.tree.min
    }

    fn max(&self) -> Vec3<f64> {
        self.tree.max
    }

    fn contains(&self, point: Vec3<f64>) -> bool {
        in_box(point, self.tree.min, self.tree.max) && *self.tree.tree.predict(point)
    }
}

#[inline]
fn in_box(p: Vec3<f64>, min: Vec3<f64>, max: Vec3<f64>) -> bool {
    p.x >= min.x && p.y >= min.y && p.z >= min.z && p.x <= max.x && p.y <= max.y && p.z <= max.z
}

/// Collision queries against a bounded solid tree.
///
/// The bounding box acts as the universe: rays collide with the surface of
/// the "true" region clipped to the box, and the box faces themselves count
/// as surface where the solid touches them.
pub struct TreeCollider {
    tree: BoundedSolidTree,
    // Lazily-built surface meshes of the true leaf cells, for sphere
    // queries. Double-checked under the lock.
    true_polytopes: RwLock<Option<Arc<Vec<MeshCollider>>>>,
}

impl TreeCollider {
    pub fn new(tree: BoundedSolidTree) -> Self {
        Self {
            tree,
            true_polytopes: RwLock::new(None),
        }
    }

    pub fn tree(&self) -> &BoundedSolidTree {
        &self.tree
    }

    /// Visit every surface crossing along a ray, in order; returns the
    /// number of collisions.
    ///
    /// A collision is emitted wherever the predicted value flips between
    /// true and false, with the split plane's unit normal flipped to face
    /// against the ray on exits. Entering or leaving the bounding box while
    /// inside the solid emits a collision on the box face.
    pub fn ray_collisions(
        &self,
        origin: Vec3<f64>,
        direction: Vec3<f64>,
        mut f: impl FnMut(RayCollision),
    ) -> usize {
        let hits = box_ray_collisions(self.tree.min, self.tree.max, origin, direction);
        if hits.is_empty() {
            return 0;
        }

        let (entry, exit, cur_point, mut cur_t) = if hits.len() == 1 {
            (None, hits[0], origin, 0.0)
        } else {
            (
                Some(hits[0]),
                hits[1],
                origin + direction.scale(hits[0].scale),
                hits[0].scale,
            )
        };

        let mut prev_value = *self.tree.tree.predict(cur_point);
        let mut count = 0;

        if let Some(entry) = entry {
            if prev_value {
                count += 1;
                f(entry);
            }
        }

        let mut terminated = false;
        let tree = &self.tree.tree;
        tree.ray_change_points(cur_point, direction, |t, p, n| {
            cur_t += t;
            if cur_t >= exit.scale {
                // The path change happens past the bounding box.
                terminated = true;
                if prev_value {
                    count += 1;
                    f(exit);
                }
                return false;
            }

            let new_value = *tree.predict(p);
            if new_value != prev_value {
                prev_value = new_value;
                count += 1;
                let normal = if new_value { n } else { -n };
                f(RayCollision {
                    scale: cur_t,
                    normal,
                });
            }
            true
        });

        if !terminated && prev_value {
            count += 1;
            f(exit);
        }

        count
    }

    /// Whether any point of the solid's surface lies within `radius` of
    /// `center`.
    pub fn sphere_collision(&self, center: Vec3<f64>, radius: f64) -> bool {
        let polytopes = self.polytope_meshes();
        polytopes
            .iter()
            .any(|mesh| mesh.sphere_collision(center, radius))
    }

    fn polytope_meshes(&self) -> Arc<Vec<MeshCollider>> {
        if let Some(meshes) = self.true_polytopes.read().expect("cache lock").as_ref() {
            return meshes.clone();
        }
        let mut guard = self.true_polytopes.write().expect("cache lock");
        if let Some(meshes) = guard.as_ref() {
            return meshes.clone();
        }
        let polytopes = tree_polytopes(&self.tree);
        let meshes: Vec<MeshCollider> = polytopes
            .par_iter()
            .map(|p| MeshCollider::new(&convex_polytope_mesh(p)))
            .collect();
        let meshes = Arc::new(meshes);
        *guard = Some(meshes.clone());
        meshes
    }
}

impl Collider3 for TreeCollider {
    fn min(&self) -> Vec3<f64> {
        self.tree.min
    }

    fn max(&self) -> Vec3<f64> {
        self.tree.max
    }

    fn first_ray_collision(
        &self,
        origin: Vec3<f64>,
        direction: Vec3<f64>,
    ) -> Option<RayCollision> {
        let mut first = None;
        self.ray_collisions(origin, direction, |rc| {
            if first.is_none() {
                first = Some(rc);
            }
        });
        first
    }
}

/// The convex cells of every `true` leaf, clipped to the bounding box.
pub fn tree_polytopes(bounded: &BoundedSolidTree) -> Vec<Polytope<f64, Vec3<f64>>> {
    fn rec(
        tree: &SolidTree,
        cell: Polytope<f64, Vec3<f64>>,
        out: &mut Vec<Polytope<f64, Vec3<f64>>>,
    ) {
        match tree {
            Tree::Leaf(true) => out.push(cell),
            Tree::Leaf(false) => {}
            Tree::Branch {
                axis,
                threshold,
                less_than,
                greater_equal,
            } => {
                rec(less_than, cell.constrain(*axis, *threshold), out);
                rec(greater_equal, cell.constrain(-*axis, -*threshold), out);
            }
        }
    }

    let mut out = Vec::new();
    rec(
        &bounded.tree,
        Polytope::cube(bounded.min, bounded.max),
        &mut out,
    );
    out
}

/// A collider whose collision normals come from a normal-map ensemble.
pub struct MapNormals<C> {
    inner: C,
    normals: crate::tree::VecSumNormEnsemble<f64, Vec3<f64>, Vec3<f64>>,
}

impl<C: Collider3> MapNormals<C> {
    /// Panics if `normals` is empty.
    pub fn new(inner: C, normals: Vec<Arc<crate::tree::CoordTree>>) -> Self {
        Self {
            inner,
            normals: crate::tree::VecSumNormEnsemble::new(normals),
        }
    }
}

impl<C: Collider3> Collider3 for MapNormals<C> {
    fn min(&self) -> Vec3<f64> {
        self.inner.min()
    }

    fn max(&self) -> Vec3<f64> {
        self.inner.max()
    }

    fn first_ray_collision(
        &self,
        origin: Vec3<f64>,
        direction: Vec3<f64>,
    ) -> Option<RayCollision> {
        self.inner.first_ray_collision(origin, direction).map(|rc| {
            let point = origin + direction.scale(rc.scale);
            let mapped = self.normals.predict(point);
            if mapped == Vec3::zero() {
                rc
            } else {
                RayCollision {
                    scale: rc.scale,
                    normal: mapped,
                }
            }
        })
    }
}

/// Entry/exit collisions of a ray against an axis-aligned box, sorted by
/// scale, with outward face normals. At most two; one when the origin is
/// inside.
fn box_ray_collisions(
    min: Vec3<f64>,
    max: Vec3<f64>,
    origin: Vec3<f64>,
    direction: Vec3<f64>,
) -> Vec<RayCollision> {
    let mut t_min = f64::NEG_INFINITY;
    let mut t_max = f64::INFINITY;
    let mut entry_axis = 0;
    let mut exit_axis = 0;

    for i in 0..3 {
        let o = origin.component(i);
        let d = direction.component(i);
        if d == 0.0 {
            if o < min.component(i) || o > max.component(i) {
                return Vec::new();
            }
            continue;
        }
        let inv = 1.0 / d;
        let (lo, hi) = {
            let a = (min.component(i) - o) * inv;
            let b = (max.component(i) - o) * inv;
            if a <= b {
                (a, b)
            } else {
                (b, a)
            }
        };
        if lo > t_min {
            t_min = lo;
            entry_axis = i;
        }
        if hi < t_max {
            t_max = hi;
            exit_axis = i;
        }
        if t_min > t_max {
            return Vec::new();
        }
    }

    if t_max < 0.0 {
        return Vec::new();
    }

    let face_normal = |axis: usize, outgoing: bool| -> Vec3<f64> {
        let sign = if direction.component(axis) >= 0.0 {
            1.0
        } else {
            -1.0
        };
        let sign = if outgoing { sign } else { -sign };
        match axis {
            0 => Vec3::new(sign, 0.0, 0.0),
            1 => Vec3::new(0.0, sign, 0.0),
            _ => Vec3::new(0.0, 0.0, sign),
        }
    };

    let mut hits = Vec::with_capacity(2);
    if t_min > 0.0 {
        hits.push(RayCollision {
            scale: t_min,
            normal: face_normal(entry_axis, false),
        });
    }
    hits.push(RayCollision {
        scale: t_max,
        normal: face_normal(exit_axis, true),
    });
    hits
}
