//! Axis-angle rotations.
//!
//! Used by the mesh boundary sampler, which meshes a randomly rotated copy of
//! the solid so grid artifacts never align with the shape.

use rand::Rng;

use super::vector::{Coord, Vec3};

/// A 3D rotation stored as a row-major matrix.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rotation {
    rows: [Vec3<f64>; 3],
}

impl Rotation {
    /// Rotation by `angle` radians around the unit vector `axis` (Rodrigues).
    pub fn axis_angle(axis: Vec3<f64>, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        let (x, y, z) = (axis.x, axis.y, axis.z);
        Self {
            rows: [
                Vec3::new(t * x * x + c, t * x * y - s * z, t * x * z + s * y),
                Vec3::new(t * x * y + s * z, t * y * y + c, t * y * z - s * x),
                Vec3::new(t * x * z - s * y, t * y * z + s * x, t * z * z + c),
            ],
        }
    }

    /// A uniformly random rotation: random unit axis, random angle in
    /// [0, 2*pi).
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let axis: Vec3<f64> = Coord::random_unit(rng);
        let angle = rng.gen::<f64>() * std::f64::consts::TAU;
        Self::axis_angle(axis, angle)
    }

    #[inline]
    pub fn apply(&self, p: Vec3<f64>) -> Vec3<f64> {
        Vec3::new(self.rows[0].dot(p), self.rows[1].dot(p), self.rows[2].dot(p))
    }

    /// The inverse rotation (transpose).
    pub fn inverse(&self) -> Self {
        let r = &self.rows;
        Self {
            rows: [
                Vec3::new(r[0].x, r[1].x, r[2].x),
                Vec3::new(r[0].y, r[1].y, r[2].y),
                Vec3::new(r[0].z, r[1].z, r[2].z),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn rotation_preserves_norm() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let r = Rotation::random(&mut rng);
        let p = Vec3::new(0.3, -1.2, 2.5);
        assert_relative_eq!(r.apply(p).norm(), p.norm(), epsilon = 1e-12);
    }

    #[test]
    fn inverse_round_trips() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        let r = Rotation::random(&mut rng);
        let p = Vec3::new(1.0, 2.0, 3.0);
        let q = r.inverse().apply(r.apply(p));
        assert_relative_eq!(q.x, p.x, epsilon = 1e-12);
        assert_relative_eq!(q.y, p.y, epsilon = 1e-12);
        assert_relative_eq!(q.z, p.z, epsilon = 1e-12);
    }
}
