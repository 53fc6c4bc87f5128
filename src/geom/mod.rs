//! Geometry primitives: vectors, polytopes, rotations, and solids.

mod icosphere;
mod polytope;
mod rotation;
mod vector;

pub use icosphere::icosphere_vertices;
pub use polytope::{Inequality, Polytope};
pub use rotation::Rotation;
pub use vector::{Coord, Real, Vec2, Vec3};

/// A bounded containment oracle over 3D space.
///
/// Everything a builder needs to learn a shape: a bounding box and a
/// point-membership test. Implementations must answer `contains` consistently
/// for concurrent callers.
pub trait Solid: Sync {
    fn min(&self) -> Vec3<f64>;
    fn max(&self) -> Vec3<f64>;
    fn contains(&self, point: Vec3<f64>) -> bool;
}

impl<S: Solid + ?Sized> Solid for &S {
    fn min(&self) -> Vec3<f64> {
        (**self).min()
    }

    fn max(&self) -> Vec3<f64> {
        (**self).max()
    }

    fn contains(&self, point: Vec3<f64>) -> bool {
        (**self).contains(point)
    }
}

/// A solid defined by explicit bounds and a membership closure.
pub struct FuncSolid<F: Fn(Vec3<f64>) -> bool + Sync> {
    pub min: Vec3<f64>,
    pub max: Vec3<f64>,
    pub contains: F,
}

impl<F: Fn(Vec3<f64>) -> bool + Sync> Solid for FuncSolid<F> {
    fn min(&self) -> Vec3<f64> {
        self.min
    }

    fn max(&self) -> Vec3<f64> {
        self.max
    }

    fn contains(&self, point: Vec3<f64>) -> bool {
        (self.contains)(point)
    }
}

/// A solid rotated about the origin.
pub struct RotatedSolid<S: Solid> {
    solid: S,
    rotation: Rotation,
    inverse: Rotation,
    min: Vec3<f64>,
    max: Vec3<f64>,
}

impl<S: Solid> RotatedSolid<S> {
    pub fn new(solid: S, rotation: Rotation) -> Self {
        // The rotated bounds are the box around the rotated corners.
        let (lo, hi) = (solid.min(), solid.max());
        let mut min = Vec3::splat(f64::INFINITY);
        let mut max = Vec3::splat(f64::NEG_INFINITY);
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { lo.x } else { hi.x },
                if i & 2 == 0 { lo.y } else { hi.y },
                if i & 4 == 0 { lo.z } else { hi.z },
            );
            let r = rotation.apply(corner);
            min = min.min(r);
            max = max.max(r);
        }
        Self {
            inverse: rotation.inverse(),
            solid,
            rotation,
            min,
            max,
        }
    }

    pub fn rotation(&self) -> &Rotation {
        &self.rotation
    }
}

impl<S: Solid> Solid for RotatedSolid<S> {
    fn min(&self) -> Vec3<f64> {
        self.min
    }

    fn max(&self) -> Vec3<f64> {
        self.max
    }

    fn contains(&self, point: Vec3<f64>) -> bool {
        self.solid.contains(self.inverse.apply(point))
    }
}
