//! Adaptive greedy construction with on-demand resampling.
//!
//! Like the greedy builder, but the dataset is regenerated as the recursion
//! descends: when a cell of the nested polytope holds fewer than
//! `min_samples` points, new points are drawn inside the cell by hit-and-run
//! sampling and labeled by the caller's oracle. Candidate axes come from an
//! [`AxisSchedule`](super::AxisSchedule), so the search can refine the best
//! direction over several stages.

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::fork::ForkQueue;
use crate::geom::{Coord, Polytope, Real};
use crate::loss::SplitLoss;
use crate::sample::HitAndRunSampler;
use crate::tree::{partition, Tree};

use super::axes::{spawn_rngs, AxisSchedule};

pub const DEFAULT_ADAPTIVE_SAMPLE_ITERS: usize = 20;

/// Build a tree over `bounds`, resampling each cell that runs low on data.
///
/// `points` must all lie inside `bounds` and `labels[i] = oracle(points[i])`.
/// A node becomes a leaf when `max_depth` is exhausted or stage 0 of the
/// axis schedule finds no split that separates its samples.
#[allow(clippy::too_many_arguments)]
pub fn adaptive_greedy_tree<F, C, T, L, S, O>(
    schedule: &S,
    bounds: Polytope<F, C>,
    points: Vec<C>,
    labels: Vec<T>,
    oracle: &O,
    loss: &L,
    sampler: &HitAndRunSampler<F>,
    min_samples: usize,
    concurrency: usize,
    max_depth: usize,
    rng: &mut Xoshiro256PlusPlus,
) -> Tree<F, C, T>
where
    F: Real,
    C: Coord<F>,
    T: Copy + Send + Sync,
    L: SplitLoss<F, T>,
    S: AxisSchedule<F, C>,
    O: Fn(C) -> T + Sync,
{
    let queue = ForkQueue::new(concurrency);
    build(
        schedule,
        bounds,
        points,
        labels,
        oracle,
        loss,
        sampler,
        min_samples,
        &queue,
        max_depth,
        rng,
    )
}

#[allow(clippy::too_many_arguments)]
fn build<F, C, T, L, S, O>(
    schedule: &S,
    bounds: Polytope<F, C>,
    mut points: Vec<C>,
    mut labels: Vec<T>,
    oracle: &O,
    loss: &L,
    sampler: &HitAndRunSampler<F>,
    min_samples: usize,
    queue: &ForkQueue,
    max_depth: usize,
    rng: &mut Xoshiro256PlusPlus,
) -> Tree<F, C, T>
where
    F: Real,
    C: Coord<F>,
    T: Copy + Send + Sync,
    L: SplitLoss<F, T>,
    S: AxisSchedule<F, C>,
    O: Fn(C) -> T + Sync,
{
    if max_depth == 0 {
        return Tree::leaf(loss.predict(&labels));
    }

    adaptive_resample(
        &bounds,
        &mut points,
        &mut labels,
        oracle,
        sampler,
        min_samples,
        queue,
        rng,
    );

    // Staged axis search; keep the best split across stages.
    let mut best: Option<(f64, C, F)> = None;
    let mut stage = 0;
    loop {
        let axes = if stage == 0 {
            schedule.init()
        } else {
            let Some((_, best_axis, _)) = best else {
                break;
            };
            schedule.next(stage, best_axis, rng)
        };
        if axes.is_empty() {
            break;
        }

        let candidates = queue.map(axes, |axis| evaluate_axis(axis, &points, &labels, loss));
        for candidate in candidates.into_iter().flatten() {
            if best.map_or(true, |(l, _, _)| candidate.0 < l) {
                best = Some(candidate);
            }
        }

        if stage == 0 && best.is_none() {
            // No separating split exists at this node.
            return Tree::leaf(loss.predict(&labels));
        }
        stage += 1;
    }

    let Some((_, axis, threshold)) = best else {
        return Tree::leaf(loss.predict(&labels));
    };

    let mid = partition(axis, threshold, &mut points, &mut labels);
    if mid == 0 || mid == points.len() {
        // Resampled data no longer supports the chosen split.
        return Tree::leaf(loss.predict(&labels));
    }
    let right_points = points.split_off(mid);
    let right_labels = labels.split_off(mid);

    let left_bounds = bounds.constrain(axis, threshold);
    let right_bounds = bounds.constrain(-axis, -threshold);

    let less_than = build(
        schedule,
        left_bounds,
        points,
        labels,
        oracle,
        loss,
        sampler,
        min_samples,
        queue,
        max_depth - 1,
        rng,
    );
    let greater_equal = build(
        schedule,
        right_bounds,
        right_points,
        right_labels,
        oracle,
        loss,
        sampler,
        min_samples,
        queue,
        max_depth - 1,
        rng,
    );
    Tree::branch(axis, threshold, less_than, greater_equal)
}

/// Best split along one axis, or `None` when every candidate is degenerate.
fn evaluate_axis<F: Real, C: Coord<F>, T: Copy, L: SplitLoss<F, T>>(
    axis: C,
    points: &[C],
    labels: &[T],
    loss: &L,
) -> Option<(f64, C, F)> {
    let mut order: Vec<u32> = (0..points.len() as u32).collect();
    let projections: Vec<F> = points.iter().map(|&p| p.dot(axis)).collect();
    order.sort_by(|&a, &b| {
        projections[a as usize]
            .partial_cmp(&projections[b as usize])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let sorted_labels: Vec<T> = order.iter().map(|&i| labels[i as usize]).collect();
    let sorted_projections: Vec<F> = order.iter().map(|&i| projections[i as usize]).collect();

    let info = loss.minimum_split(&sorted_labels, &sorted_projections);
    if info.index == 0 || info.index == points.len() {
        return None;
    }
    let threshold = (sorted_projections[info.index - 1] + sorted_projections[info.index])
        * F::from_f64(0.5);
    Some((info.loss, axis, threshold))
}

/// Top up a cell's dataset to `min_samples` labeled points.
///
/// New points are drawn by hit-and-run chains started at randomly chosen
/// existing in-cell points and labeled by the oracle. Panics if the cell has
/// no point to start from.
#[allow(clippy::too_many_arguments)]
pub(crate) fn adaptive_resample<F, C, T, O>(
    bounds: &Polytope<F, C>,
    points: &mut Vec<C>,
    labels: &mut Vec<T>,
    oracle: &O,
    sampler: &HitAndRunSampler<F>,
    min_samples: usize,
    queue: &ForkQueue,
    rng: &mut Xoshiro256PlusPlus,
) where
    F: Real,
    C: Coord<F>,
    T: Send,
    O: Fn(C) -> T + Sync,
{
    if points.len() >= min_samples {
        return;
    }
    assert!(
        !points.is_empty(),
        "cell has no in-cell point to start sampling from"
    );

    let needed = min_samples - points.len();
    let work: Vec<(C, Xoshiro256PlusPlus)> = {
        let rngs = spawn_rngs(rng, needed);
        rngs.into_iter()
            .map(|r| (points[rng.gen_range(0..points.len())], r))
            .collect()
    };

    let fresh = queue.map(work, |(start, mut r)| {
        let point = sampler.sample(&mut r, bounds, start);
        let label = oracle(point);
        (point, label)
    });
    for (point, label) in fresh {
        points.push(point);
        labels.push(label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::ConstantAxisSchedule;
    use crate::geom::Vec3;
    use crate::loss::EntropySplitLoss;
    use rand::SeedableRng;

    #[test]
    fn resample_tops_up_cell() {
        let bounds = Polytope::cube(Vec3::splat(0.0), Vec3::splat(1.0));
        let mut points = vec![Vec3::splat(0.5)];
        let mut labels = vec![true];
        let oracle = |p: Vec3<f64>| p.x < 0.75;
        let sampler = HitAndRunSampler::new(10);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);

        adaptive_resample(
            &bounds,
            &mut points,
            &mut labels,
            &oracle,
            &sampler,
            64,
            &ForkQueue::new(1),
            &mut rng,
        );

        assert_eq!(points.len(), 64);
        assert_eq!(labels.len(), 64);
        for (p, l) in points.iter().zip(labels.iter()) {
            assert!(bounds.contains(*p));
            assert_eq!(*l, p.x < 0.75);
        }
    }

    #[test]
    fn adaptive_tree_learns_halfspace() {
        let bounds = Polytope::cube(Vec3::splat(0.0), Vec3::splat(1.0));
        let oracle = |p: Vec3<f64>| p.x >= 0.5;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);

        // Sparse initial data; the builder must resample to find the split.
        let points: Vec<Vec3<f64>> = (0..8)
            .map(|i| Vec3::new((i as f64 + 0.5) / 8.0, 0.5, 0.5))
            .collect();
        let labels: Vec<bool> = points.iter().map(|&p| oracle(p)).collect();

        let schedule = ConstantAxisSchedule::new(vec![
            Vec3::x_axis(),
            Vec3::y_axis(),
            Vec3::z_axis(),
        ]);
        let tree = adaptive_greedy_tree(
            &schedule,
            bounds,
            points,
            labels,
            &oracle,
            &EntropySplitLoss::default(),
            &HitAndRunSampler::new(10),
            200,
            1,
            4,
            &mut rng,
        );

        let mut check = Xoshiro256PlusPlus::seed_from_u64(6);
        let mut correct = 0;
        const N: usize = 2000;
        for _ in 0..N {
            let p = Vec3::new(check.gen(), check.gen(), check.gen());
            if *tree.predict(p) == oracle(p) {
                correct += 1;
            }
        }
        assert!(correct as f64 / N as f64 > 0.97, "accuracy {}", correct);
    }
}
