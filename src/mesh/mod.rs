//! Triangle meshes and the geometric machinery built on them.
//!
//! Trees are learned from meshes and verified against them, so this module
//! carries the full round trip: STL I/O, a BVH-backed collider and
//! containment oracle, grid meshing of an arbitrary [`Solid`], exact
//! plane-splitting of meshes, and conversion of convex polytopes to meshes.
//!
//! [`Solid`]: crate::geom::Solid

mod bvh;
mod convex;
mod grid;
mod split;
mod stl;
mod surface;

pub use bvh::{MeshCollider, MeshSolid};
pub use convex::convex_polytope_mesh;
pub use grid::grid_mesh;
pub use split::{split_mesh, split_triangle};
pub use stl::{read_stl, write_stl};
pub use surface::{mesh_surface_tree, MeshPlaneSampler};

use rand::Rng;

use crate::geom::{Coord, Rotation, Vec3};

/// A triangle in 3D, wound counter-clockwise when viewed from outside.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Triangle {
    pub vertices: [Vec3<f64>; 3],
}

impl Triangle {
    pub fn new(a: Vec3<f64>, b: Vec3<f64>, c: Vec3<f64>) -> Self {
        Self {
            vertices: [a, b, c],
        }
    }

    /// Unnormalized normal (cross product of the edges).
    #[inline]
    pub fn raw_normal(&self) -> Vec3<f64> {
        let [a, b, c] = self.vertices;
        (b - a).cross(c - a)
    }

    /// Unit normal; the zero vector for degenerate triangles.
    pub fn normal(&self) -> Vec3<f64> {
        let n = self.raw_normal();
        let len = n.norm();
        if len == 0.0 {
            Vec3::zero()
        } else {
            n.scale(1.0 / len)
        }
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.raw_normal().norm() * 0.5
    }

    #[inline]
    pub fn min(&self) -> Vec3<f64> {
        self.vertices[0].min(self.vertices[1]).min(self.vertices[2])
    }

    #[inline]
    pub fn max(&self) -> Vec3<f64> {
        self.vertices[0].max(self.vertices[1]).max(self.vertices[2])
    }

    #[inline]
    pub fn centroid(&self) -> Vec3<f64> {
        (self.vertices[0] + self.vertices[1] + self.vertices[2]).scale(1.0 / 3.0)
    }

    /// A uniform random point on the triangle via barycentric sampling.
    pub fn sample_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3<f64> {
        let mut u: f64 = rng.gen();
        let mut v: f64 = rng.gen();
        if u + v > 1.0 {
            u = 1.0 - u;
            v = 1.0 - v;
        }
        let [a, b, c] = self.vertices;
        a + (b - a).scale(u) + (c - a).scale(v)
    }

    /// Distance from `point` to the closest point on the triangle.
    pub fn point_distance(&self, point: Vec3<f64>) -> f64 {
        // Ericson's closest-point-on-triangle.
        let [a, b, c] = self.vertices;
        let ab = b - a;
        let ac = c - a;
        let ap = point - a;

        let d1 = ab.dot(ap);
        let d2 = ac.dot(ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return ap.norm();
        }

        let bp = point - b;
        let d3 = ab.dot(bp);
        let d4 = ac.dot(bp);
        if d3 >= 0.0 && d4 <= d3 {
            return bp.norm();
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return (ap - ab.scale(v)).norm();
        }

        let cp = point - c;
        let d5 = ab.dot(cp);
        let d6 = ac.dot(cp);
        if d6 >= 0.0 && d5 <= d6 {
            return cp.norm();
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return (ap - ac.scale(w)).norm();
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return (bp - (c - b).scale(w)).norm();
        }

        let n = self.raw_normal();
        (ap.dot(n) / n.norm()).abs()
    }

    /// Ray intersection (Moller-Trumbore). Returns the ray scale, or None
    /// when the ray misses or runs parallel to the plane.
    pub fn ray_intersection(&self, origin: Vec3<f64>, direction: Vec3<f64>) -> Option<f64> {
        const EPS: f64 = 1e-12;
        let [a, b, c] = self.vertices;
        let ab = b - a;
        let ac = c - a;
        let pvec = direction.cross(ac);
        let det = ab.dot(pvec);
        if det.abs() < EPS {
            return None;
        }
        let inv_det = 1.0 / det;
        let tvec = origin - a;
        let u = tvec.dot(pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let qvec = tvec.cross(ab);
        let v = direction.dot(qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = ac.dot(qvec) * inv_det;
        if t > 0.0 {
            Some(t)
        } else {
            None
        }
    }
}

/// A triangle soup.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    pub fn new(triangles: Vec<Triangle>) -> Self {
        Self { triangles }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn min(&self) -> Vec3<f64> {
        self.triangles
            .iter()
            .map(Triangle::min)
            .fold(Vec3::splat(f64::INFINITY), Vec3::min)
    }

    pub fn max(&self) -> Vec3<f64> {
        self.triangles
            .iter()
            .map(Triangle::max)
            .fold(Vec3::splat(f64::NEG_INFINITY), Vec3::max)
    }

    pub fn total_area(&self) -> f64 {
        self.triangles.iter().map(Triangle::area).sum()
    }

    /// Drop zero-area triangles; returns how many were removed.
    pub fn remove_degenerate(&mut self) -> usize {
        let before = self.triangles.len();
        self.triangles.retain(|t| t.area() > 0.0);
        before - self.triangles.len()
    }

    pub fn transform(&self, rotation: &Rotation) -> Mesh {
        Mesh::new(
            self.triangles
                .iter()
                .map(|t| {
                    Triangle::new(
                        rotation.apply(t.vertices[0]),
                        rotation.apply(t.vertices[1]),
                        rotation.apply(t.vertices[2]),
                    )
                })
                .collect(),
        )
    }
}

/// Area-weighted random point sampling over a mesh surface.
///
/// Cumulative areas are precomputed; each draw binary-searches a uniform
/// variate into a triangle and samples barycentrically within it.
pub struct MeshPointSampler<'a> {
    mesh: &'a Mesh,
    cumulative: Vec<f64>,
}

impl<'a> MeshPointSampler<'a> {
    /// Panics if the mesh has no area.
    pub fn new(mesh: &'a Mesh) -> Self {
        let mut cumulative = Vec::with_capacity(mesh.triangles.len());
        let mut total = 0.0;
        for t in &mesh.triangles {
            total += t.area();
            cumulative.push(total);
        }
        assert!(total > 0.0, "cannot sample points on a zero-area mesh");
        Self { mesh, cumulative }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3<f64> {
        let total = *self.cumulative.last().expect("non-empty mesh");
        let target = rng.gen::<f64>() * total;
        let idx = match self
            .cumulative
            .binary_search_by(|c| c.partial_cmp(&target).expect("finite areas"))
        {
            Ok(i) => i,
            Err(i) => i.min(self.mesh.triangles.len() - 1),
        };
        self.mesh.triangles[idx].sample_point(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn triangle_area_and_normal() {
        let t = Triangle::new(
            Vec3::zero(),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        );
        assert_relative_eq!(t.area(), 0.5);
        assert_eq!(t.normal(), Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn ray_hits_triangle() {
        let t = Triangle::new(
            Vec3::new(-1.0, -1.0, 2.0),
            Vec3::new(1.0, -1.0, 2.0),
            Vec3::new(0.0, 1.0, 2.0),
        );
        let hit = t.ray_intersection(Vec3::zero(), Vec3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(hit.expect("should hit"), 2.0);
        assert!(t
            .ray_intersection(Vec3::new(5.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0))
            .is_none());
    }

    #[test]
    fn point_distance_cases() {
        let t = Triangle::new(
            Vec3::zero(),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
        );
        // Above the face.
        assert_relative_eq!(t.point_distance(Vec3::new(0.5, 0.5, 1.0)), 1.0);
        // Closest to a vertex.
        assert_relative_eq!(
            t.point_distance(Vec3::new(-3.0, -4.0, 0.0)),
            5.0,
            epsilon = 1e-12
        );
        // Closest to an edge.
        assert_relative_eq!(t.point_distance(Vec3::new(1.0, -2.0, 0.0)), 2.0);
    }

    #[test]
    fn sampler_respects_area_weights() {
        // One tiny and one large triangle; nearly all samples should land on
        // the large one.
        let mesh = Mesh::new(vec![
            Triangle::new(
                Vec3::zero(),
                Vec3::new(0.01, 0.0, 0.0),
                Vec3::new(0.0, 0.01, 0.0),
            ),
            Triangle::new(
                Vec3::new(10.0, 0.0, 0.0),
                Vec3::new(20.0, 0.0, 0.0),
                Vec3::new(10.0, 10.0, 0.0),
            ),
        ]);
        let sampler = MeshPointSampler::new(&mesh);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(8);
        let mut large = 0;
        for _ in 0..1000 {
            if sampler.sample(&mut rng).x >= 10.0 {
                large += 1;
            }
        }
        assert!(large > 990);
    }
}
