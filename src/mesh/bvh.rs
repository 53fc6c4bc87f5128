//! A bounding-volume hierarchy over mesh triangles.
//!
//! Backs the containment oracle used for dataset labeling (ray-parity test)
//! and the geometric queries tests compare trees against: ray collisions,
//! sphere collisions, and nearest-surface normals.

use crate::collide::{Collider3, RayCollision};
use crate::geom::{Coord, Solid, Vec3};

use super::{Mesh, Triangle};

const LEAF_SIZE: usize = 8;

#[derive(Copy, Clone, Debug)]
struct Aabb {
    min: Vec3<f64>,
    max: Vec3<f64>,
}

impl Aabb {
    fn empty() -> Self {
        Self {
            min: Vec3::splat(f64::INFINITY),
            max: Vec3::splat(f64::NEG_INFINITY),
        }
    }

    fn grow(&mut self, t: &Triangle) {
        self.min = self.min.min(t.min());
        self.max = self.max.max(t.max());
    }

    /// Slab test; returns the entry/exit scales when the ray touches the box.
    fn ray_range(&self, origin: Vec3<f64>, inv_dir: Vec3<f64>) -> Option<(f64, f64)> {
        let mut t_min = f64::NEG_INFINITY;
        let mut t_max = f64::INFINITY;
        for i in 0..3 {
            let inv = inv_dir.component(i);
            let lo = (self.min.component(i) - origin.component(i)) * inv;
            let hi = (self.max.component(i) - origin.component(i)) * inv;
            let (lo, hi) = if inv >= 0.0 { (lo, hi) } else { (hi, lo) };
            t_min = t_min.max(lo);
            t_max = t_max.min(hi);
            if t_min > t_max {
                return None;
            }
        }
        if t_max < 0.0 {
            None
        } else {
            Some((t_min, t_max))
        }
    }

    fn sphere_overlaps(&self, center: Vec3<f64>, radius: f64) -> bool {
        let clamped = center.max(self.min).min(self.max);
        clamped.dist(center) <= radius
    }

    fn point_distance(&self, point: Vec3<f64>) -> f64 {
        let clamped = point.max(self.min).min(self.max);
        clamped.dist(point)
    }
}

enum Node {
    Leaf {
        bounds: Aabb,
        triangles: Vec<Triangle>,
    },
    Internal {
        bounds: Aabb,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn bounds(&self) -> &Aabb {
        match self {
            Node::Leaf { bounds, .. } => bounds,
            Node::Internal { bounds, .. } => bounds,
        }
    }

    fn build(mut triangles: Vec<Triangle>) -> Node {
        let mut bounds = Aabb::empty();
        for t in &triangles {
            bounds.grow(t);
        }
        if triangles.len() <= LEAF_SIZE {
            return Node::Leaf { bounds, triangles };
        }

        // Median split along the widest centroid axis.
        let size = bounds.max - bounds.min;
        let axis = if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        };
        triangles.sort_by(|a, b| {
            a.centroid()
                .component(axis)
                .partial_cmp(&b.centroid().component(axis))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let right = triangles.split_off(triangles.len() / 2);
        Node::Internal {
            bounds,
            left: Box::new(Node::build(triangles)),
            right: Box::new(Node::build(right)),
        }
    }
}

/// An immutable BVH over a mesh.
pub struct MeshCollider {
    root: Node,
    min: Vec3<f64>,
    max: Vec3<f64>,
}

impl MeshCollider {
    pub fn new(mesh: &Mesh) -> Self {
        let min = mesh.min();
        let max = mesh.max();
        Self {
            root: Node::build(mesh.triangles.clone()),
            min,
            max,
        }
    }

    pub fn min(&self) -> Vec3<f64> {
        self.min
    }

    pub fn max(&self) -> Vec3<f64> {
        self.max
    }

    /// Visit every ray-triangle intersection, in no particular order.
    pub fn ray_collisions(
        &self,
        origin: Vec3<f64>,
        direction: Vec3<f64>,
        f: &mut impl FnMut(f64, &Triangle),
    ) {
        let inv_dir = Vec3::new(1.0 / direction.x, 1.0 / direction.y, 1.0 / direction.z);
        Self::ray_rec(&self.root, origin, direction, inv_dir, f);
    }

    fn ray_rec(
        node: &Node,
        origin: Vec3<f64>,
        direction: Vec3<f64>,
        inv_dir: Vec3<f64>,
        f: &mut impl FnMut(f64, &Triangle),
    ) {
        if node.bounds().ray_range(origin, inv_dir).is_none() {
            return;
        }
        match node {
            Node::Leaf { triangles, .. } => {
                for t in triangles {
                    if let Some(scale) = t.ray_intersection(origin, direction) {
                        f(scale, t);
                    }
                }
            }
            Node::Internal { left, right, .. } => {
                Self::ray_rec(left, origin, direction, inv_dir, f);
                Self::ray_rec(right, origin, direction, inv_dir, f);
            }
        }
    }

    /// The nearest intersection along the ray, if any. The returned normal
    /// is flipped to face the ray origin.
    pub fn nearest_ray_collision(
        &self,
        origin: Vec3<f64>,
        direction: Vec3<f64>,
    ) -> Option<RayCollision> {
        let mut best: Option<(f64, Triangle)> = None;
        self.ray_collisions(origin, direction, &mut |scale, t| {
            if best.map_or(true, |(s, _)| scale < s) {
                best = Some((scale, *t));
            }
        });
        best.map(|(scale, t)| {
            let mut normal = t.normal();
            if normal.dot(direction) > 0.0 {
                normal = -normal;
            }
            RayCollision { scale, normal }
        })
    }

    /// Number of intersections with `t > 0` along the ray.
    pub fn ray_collision_count(&self, origin: Vec3<f64>, direction: Vec3<f64>) -> usize {
        let mut count = 0;
        self.ray_collisions(origin, direction, &mut |_, _| count += 1);
        count
    }

    /// Whether any surface point lies within `radius` of `center`.
    pub fn sphere_collision(&self, center: Vec3<f64>, radius: f64) -> bool {
        Self::sphere_rec(&self.root, center, radius)
    }

    fn sphere_rec(node: &Node, center: Vec3<f64>, radius: f64) -> bool {
        if !node.bounds().sphere_overlaps(center, radius) {
            return false;
        }
        match node {
            Node::Leaf { triangles, .. } => triangles
                .iter()
                .any(|t| t.point_distance(center) <= radius),
            Node::Internal { left, right, .. } => {
                Self::sphere_rec(left, center, radius) || Self::sphere_rec(right, center, radius)
            }
        }
    }

    /// Unit normal of the triangle closest to `point`.
    ///
    /// Best-first traversal by box distance; used to label normal-map
    /// training targets. Returns the zero vector for an empty mesh.
    pub fn nearest_normal(&self, point: Vec3<f64>) -> Vec3<f64> {
        let mut best_dist = f64::INFINITY;
        let mut best_normal = Vec3::zero();
        Self::nearest_rec(&self.root, point, &mut best_dist, &mut best_normal);
        best_normal
    }

    fn nearest_rec(
        node: &Node,
        point: Vec3<f64>,
        best_dist: &mut f64,
        best_normal: &mut Vec3<f64>,
    ) {
        if node.bounds().point_distance(point) >= *best_dist {
            return;
        }
        match node {
            Node::Leaf { triangles, .. } => {
                for t in triangles {
                    let d = t.point_distance(point);
                    if d < *best_dist {
                        *best_dist = d;
                        *best_normal = t.normal();
                    }
                }
            }
            Node::Internal { left, right, .. } => {
                let dl = left.bounds().point_distance(point);
                let dr = right.bounds().point_distance(point);
                let (first, second) = if dl <= dr { (left, right) } else { (right, left) };
                Self::nearest_rec(first, point, best_dist, best_normal);
                Self::nearest_rec(second, point, best_dist, best_normal);
            }
        }
    }
}

impl Collider3 for MeshCollider {
    fn min(&self) -> Vec3<f64> {
        self.min
    }

    fn max(&self) -> Vec3<f64> {
        self.max
    }

    fn first_ray_collision(
        &self,
        origin: Vec3<f64>,
        direction: Vec3<f64>,
    ) -> Option<RayCollision> {
        self.nearest_ray_collision(origin, direction)
    }
}

/// A containment oracle over a watertight mesh: ray-parity membership.
pub struct MeshSolid {
    collider: MeshCollider,
}

impl MeshSolid {
    pub fn new(mesh: &Mesh) -> Self {
        Self {
            collider: MeshCollider::new(mesh),
        }
    }

    pub fn collider(&self) -> &MeshCollider {
        &self.collider
    }
}

impl Solid for MeshSolid {
    fn min(&self) -> Vec3<f64> {
        self.collider.min()
    }

    fn max(&self) -> Vec3<f64> {
        self.collider.max()
    }

    fn contains(&self, point: Vec3<f64>) -> bool {
        // An irrational-ish direction dodges rays grazing shared edges.
        let direction = Vec3::new(0.5224891157783521, 0.8104981391871146, 0.2630446871826393);
        self.collider.ray_collision_count(point, direction) % 2 == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::grid_mesh;
    use crate::geom::FuncSolid;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn sphere_mesh() -> Mesh {
        let solid = FuncSolid {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
            contains: |p: Vec3<f64>| p.norm() < 0.8,
        };
        grid_mesh(&solid, 24)
    }

    #[test]
    fn parity_containment_matches_sphere() {
        let mesh = sphere_mesh();
        let solid = MeshSolid::new(&mesh);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(21);
        let mut checked = 0;
        for _ in 0..500 {
            let p = Vec3::new(
                rng.gen::<f64>() * 2.0 - 1.0,
                rng.gen::<f64>() * 2.0 - 1.0,
                rng.gen::<f64>() * 2.0 - 1.0,
            );
            // Stay clear of the discretized surface.
            if (p.norm() - 0.8).abs() < 0.1 {
                continue;
            }
            checked += 1;
            assert_eq!(solid.contains(p), p.norm() < 0.8, "point {:?}", p);
        }
        assert!(checked > 300);
    }

    #[test]
    fn first_hit_faces_the_ray() {
        let mesh = sphere_mesh();
        let collider = MeshCollider::new(&mesh);
        let hit = collider
            .first_ray_collision(Vec3::new(-2.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0))
            .expect("ray through the sphere must hit");
        assert!((hit.scale - 1.2).abs() < 0.1, "scale {}", hit.scale);
        assert!(hit.normal.x < 0.0);
    }

    #[test]
    fn sphere_collision_distance() {
        let mesh = sphere_mesh();
        let collider = MeshCollider::new(&mesh);
        // Surface sits near radius 0.8.
        assert!(collider.sphere_collision(Vec3::new(1.5, 0.0, 0.0), 0.75));
        assert!(!collider.sphere_collision(Vec3::new(1.5, 0.0, 0.0), 0.6));
        assert!(!collider.sphere_collision(Vec3::zero(), 0.5));
    }

    #[test]
    fn nearest_normal_points_radially() {
        let mesh = sphere_mesh();
        let collider = MeshCollider::new(&mesh);
        let p = Vec3::new(0.9, 0.0, 0.0);
        let n = collider.nearest_normal(p);
        assert!(n.x.abs() > 0.9, "normal {:?}", n);
    }
}
