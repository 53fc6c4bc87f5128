//! Greedy construction of oblique trees.
//!
//! Every sample's inner product with every candidate axis is computed once up
//! front; each axis keeps a view of the samples sorted by that projection.
//! A split partitions all views with a stamp from the winning axis, so no
//! re-sorting happens below the root.

use crate::fork::ForkQueue;
use crate::geom::{Coord, Real};
use crate::loss::SplitLoss;
use crate::tree::Tree;

/// Build a tree by greedy loss minimization over `axes`.
///
/// `concurrency` caps the worker count for the per-axis split search
/// (0 = one per hardware thread); the pool never exceeds the number of axes.
/// Recursion stops at `max_depth` or when no split strictly separates the
/// samples.
pub fn greedy_tree<F: Real, C: Coord<F>, T: Copy + Send + Sync, L: SplitLoss<F, T>>(
    axes: &[C],
    points: &[C],
    labels: &[T],
    loss: &L,
    concurrency: usize,
    max_depth: usize,
) -> Tree<F, C, T> {
    assert_eq!(points.len(), labels.len());
    assert!(!axes.is_empty(), "at least one candidate axis is required");

    let workers = if concurrency == 0 {
        rayon::current_num_threads()
    } else {
        concurrency
    }
    .min(axes.len())
    .max(1);

    // Pack all projections in one contiguous buffer to avoid many tiny
    // allocations.
    let mut values = Vec::with_capacity(points.len() * axes.len());
    for &point in points {
        for &axis in axes {
            values.push(point.dot(axis));
        }
    }

    let sorted: Vec<Vec<u32>> = (0..axes.len())
        .map(|axis_idx| {
            let mut ids: Vec<u32> = (0..points.len() as u32).collect();
            ids.sort_by(|&a, &b| {
                let va = values[a as usize * axes.len() + axis_idx];
                let vb = values[b as usize * axes.len() + axis_idx];
                va.partial_cmp(&vb).unwrap_or(std::cmp::Ordering::Equal)
            });
            ids
        })
        .collect();

    let ctx = Context {
        axes,
        labels,
        values: &values,
        loss,
    };
    let mut is_right = vec![false; points.len()];

    let queue = ForkQueue::new(workers);
    build(&ctx, &queue, sorted, &mut is_right, max_depth)
}

struct Context<'a, F, C, T, L> {
    axes: &'a [C],
    labels: &'a [T],
    /// Projections, laid out `[sample * n_axes + axis]`.
    values: &'a [F],
    loss: &'a L,
}

impl<'a, F: Real, C: Coord<F>, T: Copy, L: SplitLoss<F, T>> Context<'a, F, C, T, L> {
    #[inline]
    fn value(&self, id: u32, axis_idx: usize) -> F {
        self.values[id as usize * self.axes.len() + axis_idx]
    }

    fn leaf(&self, order: &[u32]) -> Tree<F, C, T> {
        let labels: Vec<T> = order.iter().map(|&id| self.labels[id as usize]).collect();
        Tree::leaf(self.loss.predict(&labels))
    }
}

fn build<F: Real, C: Coord<F>, T: Copy + Send + Sync, L: SplitLoss<F, T>>(
    ctx: &Context<'_, F, C, T, L>,
    queue: &ForkQueue,
    sorted: Vec<Vec<u32>>,
    is_right: &mut [bool],
    depth: usize,
) -> Tree<F, C, T> {
    let n = sorted[0].len();
    if depth == 0 || n == 0 {
        return ctx.leaf(&sorted[0]);
    }

    // Results come back in axis order, so ties resolve identically regardless
    // of how the workers were scheduled.
    let results = queue.map_with(
        0..ctx.axes.len(),
        || (Vec::new(), Vec::new()),
        |(label_buf, threshold_buf): &mut (Vec<T>, Vec<F>), axis_idx| {
            label_buf.clear();
            threshold_buf.clear();
            for &id in &sorted[axis_idx] {
                label_buf.push(ctx.labels[id as usize]);
                threshold_buf.push(ctx.value(id, axis_idx));
            }
            ctx.loss.minimum_split(label_buf, threshold_buf)
        },
    );

    let (best_axis, best) = results
        .into_iter()
        .enumerate()
        .reduce(|acc, item| if item.1.loss < acc.1.loss { item } else { acc })
        .expect("at least one axis");

    if best.index == 0 || best.index == n {
        return ctx.leaf(&sorted[0]);
    }

    let lo = ctx.value(sorted[best_axis][best.index - 1], best_axis);
    let hi = ctx.value(sorted[best_axis][best.index], best_axis);
    let threshold = (lo + hi) * F::from_f64(0.5);

    // Stamp sides from the winning axis's order, then partition every view
    // without re-sorting.
    for (i, &id) in sorted[best_axis].iter().enumerate() {
        is_right[id as usize] = i >= best.index;
    }

    let mut left_sorted = Vec::with_capacity(sorted.len());
    let mut right_sorted = Vec::with_capacity(sorted.len());
    for view in &sorted {
        let mut left = Vec::with_capacity(best.index);
        let mut right = Vec::with_capacity(n - best.index);
        for &id in view {
            if is_right[id as usize] {
                right.push(id);
            } else {
                left.push(id);
            }
        }
        debug_assert_eq!(left.len(), best.index);
        left_sorted.push(left);
        right_sorted.push(right);
    }
    drop(sorted);

    let axis = ctx.axes[best_axis];
    let less_than = build(ctx, queue, left_sorted, is_right, depth - 1);
    let greater_equal = build(ctx, queue, right_sorted, is_right, depth - 1);
    Tree::branch(axis, threshold, less_than, greater_equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Vec3;
    use crate::loss::EntropySplitLoss;

    #[test]
    fn one_split_recovers_halfspace() {
        let points: Vec<Vec3<f64>> = (0..40)
            .map(|i| Vec3::new(i as f64 / 40.0, (i as f64 * 0.37).fract(), 0.0))
            .collect();
        let labels: Vec<bool> = points.iter().map(|p| p.x >= 0.5).collect();
        let axes = [Vec3::x_axis(), Vec3::y_axis(), Vec3::z_axis()];

        let tree = greedy_tree(
            &axes,
            &points,
            &labels,
            &EntropySplitLoss::default(),
            1,
            1,
        );

        for (p, l) in points.iter().zip(labels.iter()) {
            assert_eq!(tree.predict(*p), l);
        }
    }

    #[test]
    fn pure_labels_make_a_leaf() {
        let points: Vec<Vec3<f64>> = (0..10).map(|i| Vec3::splat(i as f64)).collect();
        let labels = vec![true; 10];
        let axes = [Vec3::<f64>::x_axis()];
        let tree = greedy_tree(
            &axes,
            &points,
            &labels,
            &EntropySplitLoss::default(),
            1,
            5,
        );
        assert!(tree.is_leaf());
        assert!(*tree.predict(Vec3::zero()));
    }

    #[test]
    fn empty_dataset_makes_a_leaf() {
        let axes = [Vec3::<f64>::x_axis()];
        let tree = greedy_tree::<f64, _, bool, _>(
            &axes,
            &[],
            &[],
            &EntropySplitLoss::default(),
            1,
            3,
        );
        assert!(tree.is_leaf());
    }
}
