//! Candidate-axis schedules for the adaptive builder.
//!
//! A schedule yields one or more stages of axes to search at a node. Stage 0
//! comes from [`AxisSchedule::init`]; later stages see the best axis found so
//! far and may propose refinements. An empty stage ends the search.

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::geom::{icosphere_vertices, Coord, Real, Vec3};

/// A staged source of candidate split axes.
pub trait AxisSchedule<F: Real, C: Coord<F>>: Send + Sync {
    /// Axes for stage 0 of every node search.
    fn init(&self) -> Vec<C>;

    /// Axes for `stage >= 1`, given the best axis so far. Empty ends the
    /// search at this node.
    fn next(&self, stage: usize, best: C, rng: &mut Xoshiro256PlusPlus) -> Vec<C>;
}

/// A fixed list of axes, searched once per node.
#[derive(Clone, Debug)]
pub struct ConstantAxisSchedule<C> {
    axes: Vec<C>,
}

impl<C> ConstantAxisSchedule<C> {
    pub fn new(axes: Vec<C>) -> Self {
        Self { axes }
    }

    pub fn axes(&self) -> &[C] {
        &self.axes
    }
}

impl ConstantAxisSchedule<Vec3<f64>> {
    /// Icosphere vertices at the given subdivision resolution plus the three
    /// coordinate axes, with near-duplicate directions removed
    /// (|cosine| > 0.9999 counts as a duplicate).
    pub fn icosphere(resolution: usize) -> Self {
        let mut axes: Vec<Vec3<f64>> = Vec::new();
        let candidates = icosphere_vertices(resolution)
            .into_iter()
            .chain([Vec3::x_axis(), Vec3::y_axis(), Vec3::z_axis()]);
        for candidate in candidates {
            let duplicate = axes
                .iter()
                .any(|&kept| kept.dot(candidate).abs() > 0.9999);
            if !duplicate {
                axes.push(candidate);
            }
        }
        Self { axes }
    }
}

impl<F: Real, C: Coord<F>> AxisSchedule<F, C> for ConstantAxisSchedule<C> {
    fn init(&self) -> Vec<C> {
        self.axes.clone()
    }

    fn next(&self, _stage: usize, _best: C, _rng: &mut Xoshiro256PlusPlus) -> Vec<C> {
        Vec::new()
    }
}

/// A schedule that follows its initial stage with rounds of random
/// perturbations of the best axis found so far.
///
/// Stage `s >= 1` yields `counts[s-1]` samples of
/// `normalize(best + stddevs[s-1] * gaussian)`.
#[derive(Clone, Debug)]
pub struct MutationAxisSchedule<F, C> {
    pub initial: Vec<C>,
    pub counts: Vec<usize>,
    pub stddevs: Vec<F>,
}

impl<F: Real, C: Coord<F>> AxisSchedule<F, C> for MutationAxisSchedule<F, C> {
    fn init(&self) -> Vec<C> {
        self.initial.clone()
    }

    fn next(&self, stage: usize, best: C, rng: &mut Xoshiro256PlusPlus) -> Vec<C> {
        let Some(idx) = stage.checked_sub(1) else {
            return self.initial.clone();
        };
        if idx >= self.counts.len() {
            return Vec::new();
        }
        let stddev = self.stddevs[idx];
        (0..self.counts[idx])
            .map(|_| {
                loop {
                    let perturbed = best + C::random_gaussian(rng).scale(stddev);
                    let norm = perturbed.norm();
                    if norm > F::from_f64(1e-8) {
                        return perturbed.scale(F::ONE / norm);
                    }
                }
            })
            .collect()
    }
}

/// Per-worker generators branched from a parent generator.
///
/// Workers never share a generator; results are reproducible for a fixed
/// seed when the pool has one worker.
pub fn spawn_rngs<R: Rng + ?Sized>(parent: &mut R, count: usize) -> Vec<Xoshiro256PlusPlus> {
    use rand::SeedableRng;
    (0..count)
        .map(|_| Xoshiro256PlusPlus::seed_from_u64(parent.gen()))
        .collect()
}
