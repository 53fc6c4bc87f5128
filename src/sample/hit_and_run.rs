//! Hit-and-run sampling inside convex polytopes.

use rand::Rng;

use crate::geom::{Coord, Polytope, Real};

pub const DEFAULT_HIT_AND_RUN_EPSILON: f64 = 1e-5;

/// Markov-chain sampler for points inside a polytope.
///
/// Each step picks a random direction through the current point, casts the
/// chord against the polytope, and jumps to a random point on it. More
/// iterations give more uniform samples.
#[derive(Copy, Clone, Debug)]
pub struct HitAndRunSampler<F> {
    /// Number of Monte Carlo steps per sample.
    pub iterations: usize,

    /// Margin keeping samples off the boundary, as a fraction of the chord.
    /// Guards against rounding past the polytope surface.
    pub epsilon: F,
}

impl<F: Real> HitAndRunSampler<F> {
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            epsilon: F::from_f64(DEFAULT_HIT_AND_RUN_EPSILON),
        }
    }

    /// Draw one sample, walking from `init`, which must lie inside the
    /// polytope.
    ///
    /// Panics if a chord cast is unbounded: that means the polytope is not
    /// closed, or the walk escaped it, both of which indicate corrupted
    /// inputs.
    pub fn sample<C: Coord<F>, R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        polytope: &Polytope<F, C>,
        init: C,
    ) -> C {
        let eps = self.epsilon;
        let mut cur = init;
        for _ in 0..self.iterations {
            let dir = C::random_unit(rng);
            let (neg_t, pos_t) = polytope.cast(cur, dir);

            if neg_t.is_infinite() || pos_t.is_infinite() {
                panic!("polytope is not closed or we ended up outside of it");
            }

            let frac = F::from_f64(rng.gen::<f64>()) * (F::ONE - eps - eps) + eps;
            let t = frac * (pos_t - neg_t) + neg_t;
            cur = cur + dir.scale(t);
        }
        cur
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{icosphere_vertices, Inequality, Vec3};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn samples_stay_inside() {
        let cube = Polytope::cube(Vec3::splat(-1.0), Vec3::splat(1.0));
        let sampler = HitAndRunSampler::new(10);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        for _ in 0..200 {
            let p = sampler.sample(&mut rng, &cube, Vec3::zero());
            assert!(cube.contains(p), "escaped the cube: {:?}", p);
        }
    }

    #[test]
    #[should_panic(expected = "polytope is not closed")]
    fn unbounded_polytope_panics() {
        // A single half-space is open in most directions.
        let open = Polytope::new(vec![Inequality {
            axis: Vec3::<f64>::x_axis(),
            max: 1.0,
        }]);
        let sampler = HitAndRunSampler::new(1);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        sampler.sample(&mut rng, &open, Vec3::zero());
    }

    /// Statistical uniformity check against rejection sampling in a
    /// near-spherical polytope: the mean must land within 0.01 of the
    /// origin and the mean norm within 0.05 of the reference.
    #[test]
    fn near_uniform_in_spherical_polytope() {
        let polytope = Polytope::new(
            icosphere_vertices(2)
                .into_iter()
                .map(|axis| Inequality { axis, max: 1.0 })
                .collect(),
        );
        let sampler = HitAndRunSampler::new(20);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1337);
        let start = Vec3::new(0.1, 0.1, 0.2);

        const N: usize = 50_000;
        let mut mean = Vec3::zero();
        let mut mean_norm = 0.0;
        for _ in 0..N {
            let p = sampler.sample(&mut rng, &polytope, start);
            mean = mean + p;
            mean_norm += p.norm();
        }
        mean = mean.scale(1.0 / N as f64);
        mean_norm /= N as f64;

        // Rejection-sampling reference for the unit ball.
        let mut actual_norm = 0.0;
        let mut count = 0;
        while count < N {
            let p = Vec3::new(
                rng.gen::<f64>() * 2.0 - 1.0,
                rng.gen::<f64>() * 2.0 - 1.0,
                rng.gen::<f64>() * 2.0 - 1.0,
            );
            if p.norm() <= 1.0 {
                actual_norm += p.norm();
                count += 1;
            }
        }
        actual_norm /= N as f64;

        assert!(
            (mean_norm - actual_norm).abs() < 0.05,
            "mean norm {} vs reference {}",
            mean_norm,
            actual_norm
        );
        assert!(mean.norm() < 0.01, "mean should be ~0, got {:?}", mean);
    }
}
