//! Geometric queries against trees: ray casting, collision counting, and
//! sphere tests.

mod collider;
mod ray;

pub use collider::{tree_polytopes, MapNormals, TreeCollider, TreeSolid};

use crate::geom::Vec3;

/// A ray hit against a surface.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayCollision {
    /// Scale along the ray direction.
    pub scale: f64,

    /// Unit surface normal at the hit.
    pub normal: Vec3<f64>,
}

/// Anything a ray can be traced against.
pub trait Collider3: Sync {
    fn min(&self) -> Vec3<f64>;
    fn max(&self) -> Vec3<f64>;
    fn first_ray_collision(&self, origin: Vec3<f64>, direction: Vec3<f64>)
        -> Option<RayCollision>;
}
