//! Convex polytopes as ordered half-space intersections.
//!
//! A [`Polytope`] describes the region associated with a path through a tree:
//! every ancestor split contributes one half-space. The adaptive builder and
//! the sphere collider both rely on the chord-casting primitive here.

use super::vector::{Coord, Real, Vec3};

/// One linear constraint: the half-space of points `p` with `p · axis <= max`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Inequality<F, C> {
    pub axis: C,
    pub max: F,
}

/// An intersection of closed half-spaces.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Polytope<F, C> {
    constraints: Vec<Inequality<F, C>>,
}

impl<F: Real, C: Coord<F>> Polytope<F, C> {
    pub fn new(constraints: Vec<Inequality<F, C>>) -> Self {
        Self { constraints }
    }

    /// The unbounded polytope (all of space).
    pub fn unbounded() -> Self {
        Self {
            constraints: Vec::new(),
        }
    }

    pub fn constraints(&self) -> &[Inequality<F, C>] {
        &self.constraints
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// A new polytope with one additional half-space `p · axis <= max`.
    pub fn constrain(&self, axis: C, max: F) -> Self {
        let mut constraints = Vec::with_capacity(self.constraints.len() + 1);
        constraints.extend_from_slice(&self.constraints);
        constraints.push(Inequality { axis, max });
        Self { constraints }
    }

    /// Whether `point` satisfies every half-space.
    pub fn contains(&self, point: C) -> bool {
        self.constraints
            .iter()
            .all(|ineq| point.dot(ineq.axis) <= ineq.max)
    }

    /// Cast a chord through `origin` along `direction`, assuming `origin` is
    /// strictly inside.
    ///
    /// Returns `(neg_t, pos_t)`: the largest negative and smallest positive
    /// `t` for which `origin + t * direction` still satisfies every
    /// half-space. Half-spaces parallel to the direction are ignored; a
    /// direction with no bound yields an infinite value on that side.
    pub fn cast(&self, origin: C, direction: C) -> (F, F) {
        let mut neg_t = F::neg_infinity();
        let mut pos_t = F::infinity();

        for ineq in &self.constraints {
            let dot = ineq.axis.dot(direction);
            if dot != F::ZERO {
                let offset = ineq.max - ineq.axis.dot(origin);
                let t = offset / dot;
                if t < F::ZERO {
                    if t > neg_t {
                        neg_t = t;
                    }
                } else if t < pos_t {
                    pos_t = t;
                }
            }
        }

        (neg_t, pos_t)
    }
}

impl<F: Real> Polytope<F, Vec3<F>> {
    /// The axis-aligned box `[min, max]` as six half-spaces.
    pub fn cube(min: Vec3<F>, max: Vec3<F>) -> Self {
        let mut constraints = Vec::with_capacity(6);
        for axis in Vec3::<F>::basis() {
            constraints.push(Inequality {
                axis,
                max: axis.dot(max),
            });
            constraints.push(Inequality {
                axis: -axis,
                max: -axis.dot(min),
            });
        }
        Self { constraints }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_cube() -> Polytope<f64, Vec3<f64>> {
        Polytope::cube(Vec3::splat(-1.0), Vec3::splat(1.0))
    }

    #[test]
    fn cube_contains() {
        let p = unit_cube();
        assert!(p.contains(Vec3::zero()));
        assert!(p.contains(Vec3::new(1.0, -1.0, 0.5)));
        assert!(!p.contains(Vec3::new(1.0001, 0.0, 0.0)));
    }

    #[test]
    fn cast_from_center() {
        let p = unit_cube();
        let (neg, pos) = p.cast(Vec3::zero(), Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(neg, -1.0);
        assert_relative_eq!(pos, 1.0);

        let (neg, pos) = p.cast(Vec3::new(0.5, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(neg, -1.5);
        assert_relative_eq!(pos, 0.5);
    }

    #[test]
    fn cast_ignores_parallel_half_spaces() {
        // A slab only bounds the x direction; y stays unbounded.
        let slab = Polytope::new(vec![
            Inequality {
                axis: Vec3::x_axis(),
                max: 1.0,
            },
            Inequality {
                axis: -Vec3::<f64>::x_axis(),
                max: 1.0,
            },
        ]);
        let (neg, pos) = slab.cast(Vec3::zero(), Vec3::new(0.0, 1.0, 0.0));
        assert!(neg.is_infinite());
        assert!(pos.is_infinite());
    }

    #[test]
    fn constrain_is_non_destructive() {
        let p = unit_cube();
        let q = p.constrain(Vec3::new(1.0, 1.0, 0.0), 0.0);
        assert_eq!(p.len(), 6);
        assert_eq!(q.len(), 7);
        assert!(p.contains(Vec3::new(0.5, 0.5, 0.0)));
        assert!(!q.contains(Vec3::new(0.5, 0.5, 0.0)));
    }
}
