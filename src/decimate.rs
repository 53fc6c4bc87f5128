//! Loss-guided decimation: best-replacement pruning to a leaf budget.

use std::sync::Arc;

use crate::fork::ForkQueue;
use crate::geom::{Coord, Real};
use crate::loss::{total_loss, TaoLoss};
use crate::tree::{partition, Tree};

/// A candidate prune: swap `replace` for its child `with`.
#[derive(Clone, Debug)]
pub struct Replacement<F, C, T> {
    /// Loss of the subtree before the swap, over the samples reaching it.
    pub old_loss: f64,

    /// Loss after the swap, over the same samples.
    pub new_loss: f64,

    pub replace: Arc<Tree<F, C, T>>,
    pub with: Arc<Tree<F, C, T>>,
}

impl<F, C, T> Replacement<F, C, T> {
    /// Loss reduction; negative when the swap makes things worse.
    pub fn delta(&self) -> f64 {
        self.old_loss - self.new_loss
    }
}

/// Find the single branch-to-child replacement that loses the least.
///
/// Every branch is scored by replacing it with either child and evaluating
/// the child on all samples reaching the branch; the replacement with the
/// largest [`Replacement::delta`] wins. Returns the winner (None for a leaf
/// tree) and the tree's total loss. `points` and `labels` are reordered in
/// place.
pub fn best_replacement<F, C, T, L>(
    tree: &Arc<Tree<F, C, T>>,
    loss: &L,
    points: &mut [C],
    labels: &mut [T],
    concurrency: usize,
) -> (Option<Replacement<F, C, T>>, f64)
where
    F: Real,
    C: Coord<F>,
    T: Copy + Send + Sync,
    L: TaoLoss<T>,
{
    let queue = ForkQueue::new(concurrency);
    queue.run(|| best_replacement_rec(tree, loss, points, labels, &queue))
}

struct BranchOutcome<F, C, T> {
    best: Option<Replacement<F, C, T>>,
    /// Loss of this subtree on its own samples.
    loss: f64,
    /// Loss of this subtree on the sibling's samples.
    other_loss: f64,
}

fn best_replacement_rec<F, C, T, L>(
    tree: &Arc<Tree<F, C, T>>,
    loss: &L,
    points: &mut [C],
    labels: &mut [T],
    queue: &ForkQueue,
) -> (Option<Replacement<F, C, T>>, f64)
where
    F: Real,
    C: Coord<F>,
    T: Copy + Send + Sync,
    L: TaoLoss<T>,
{
    let (axis, threshold, less_than, greater_equal) = match &**tree {
        Tree::Leaf(_) => return (None, total_loss(tree, loss, points, labels)),
        Tree::Branch {
            axis,
            threshold,
            less_than,
            greater_equal,
        } => (*axis, *threshold, less_than, greater_equal),
    };

    let mid = partition(axis, threshold, points, labels);
    let (left_points, right_points) = points.split_at_mut(mid);
    let (left_labels, right_labels) = labels.split_at_mut(mid);

    // Cross losses (each child evaluated on the sibling's samples) are
    // order-independent, so compute them before the recursions reorder the
    // slices.
    let left_other = total_loss(less_than, loss, right_points, right_labels);
    let right_other = total_loss(greater_equal, loss, left_points, left_labels);

    let (left, right) = queue.fork(
        || {
            let (best, own) =
                best_replacement_rec(less_than, loss, left_points, left_labels, queue);
            BranchOutcome {
                best,
                loss: own,
                other_loss: left_other,
            }
        },
        || {
            let (best, own) =
                best_replacement_rec(greater_equal, loss, right_points, right_labels, queue);
            BranchOutcome {
                best,
                loss: own,
                other_loss: right_other,
            }
        },
    );

    let subtree_loss = left.loss + right.loss;
    let left_new_loss = left.loss + left.other_loss;
    let right_new_loss = right.loss + right.other_loss;

    let mut best = if left_new_loss < right_new_loss {
        Replacement {
            old_loss: subtree_loss,
            new_loss: left_new_loss,
            replace: tree.clone(),
            with: less_than.clone(),
        }
    } else {
        Replacement {
            old_loss: subtree_loss,
            new_loss: right_new_loss,
            replace: tree.clone(),
            with: greater_equal.clone(),
        }
    };
    for candidate in [left.best, right.best].into_iter().flatten() {
        if candidate.delta() > best.delta() {
            best = candidate;
        }
    }
    (Some(best), subtree_loss)
}

/// Apply best replacements until the tree fits the leaf budget.
pub fn decimate<F, C, T, L>(
    mut tree: Arc<Tree<F, C, T>>,
    target_leaves: usize,
    loss: &L,
    points: &mut [C],
    labels: &mut [T],
    concurrency: usize,
) -> Arc<Tree<F, C, T>>
where
    F: Real,
    C: Coord<F>,
    T: Copy + Send + Sync,
    L: TaoLoss<T>,
{
    let queue = ForkQueue::new(concurrency);
    while tree.num_leaves() > target_leaves {
        let (replacement, _) =
            queue.run(|| best_replacement_rec(&tree, loss, points, labels, &queue));
        let Some(replacement) = replacement else {
            break;
        };
        let (next, found) = tree.replace(&replacement.replace, &replacement.with);
        debug_assert!(found, "replacement target vanished from the tree");
        tree = next;
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::greedy_tree;
    use crate::geom::Vec3;
    use crate::loss::{EntropySplitLoss, EqualityLoss};
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn dataset(n: usize) -> (Vec<Vec3<f64>>, Vec<bool>) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(99);
        let points: Vec<Vec3<f64>> = (0..n)
            .map(|_| Vec3::new(rng.gen(), rng.gen(), rng.gen()))
            .collect();
        let labels = points
            .iter()
            .map(|p| p.dist(Vec3::new(0.5, 0.5, 0.5)) < 0.4)
            .collect();
        (points, labels)
    }

    #[test]
    fn best_replacement_prefers_cheapest_collapse() {
        // Left branch is pure (collapsible for free); right branch matters.
        let tree: Arc<Tree<f64, Vec3<f64>, bool>> = Arc::new(Tree::branch(
            Vec3::x_axis(),
            0.5,
            Tree::branch(Vec3::y_axis(), 0.5, Tree::leaf(false), Tree::leaf(false)),
            Tree::branch(Vec3::y_axis(), 0.5, Tree::leaf(false), Tree::leaf(true)),
        ));

        let mut points = Vec::new();
        let mut labels = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                let p = Vec3::new(i as f64 / 10.0, j as f64 / 10.0, 0.0);
                points.push(p);
                labels.push(p.x >= 0.5 && p.y >= 0.5);
            }
        }

        let (replacement, loss) =
            best_replacement(&tree, &EqualityLoss, &mut points, &mut labels, 1);
        let replacement = replacement.expect("branch tree has candidates");
        assert_eq!(loss, 0.0);
        // Collapsing the pure left branch costs nothing.
        assert_eq!(replacement.delta(), 0.0);
        let (pruned, found) = tree.replace(&replacement.replace, &replacement.with);
        assert!(found);
        assert_eq!(pruned.num_leaves(), tree.num_leaves() - 1);
    }

    #[test]
    fn decimation_reaches_target_and_stays_reasonable() {
        let (points, labels) = dataset(4000);
        let axes = [Vec3::x_axis(), Vec3::y_axis(), Vec3::z_axis()];
        let tree = Arc::new(greedy_tree(
            &axes,
            &points,
            &labels,
            &EntropySplitLoss::default(),
            0,
            6,
        ));
        let start_leaves = tree.num_leaves();
        assert!(start_leaves > 8);

        let full_loss = total_loss(&tree, &EqualityLoss, &points, &labels);
        // Baseline: a single majority leaf.
        let majority = EqualityLoss.predict(&labels);
        let baseline_tree: Tree<f64, Vec3<f64>, bool> = Tree::leaf(majority);
        let baseline = total_loss(&baseline_tree, &EqualityLoss, &points, &labels);

        let mut ps = points.clone();
        let mut ls = labels.clone();
        let target = 8;
        let pruned = decimate(tree, target, &EqualityLoss, &mut ps, &mut ls, 0);
        assert!(pruned.num_leaves() <= target);

        let pruned_loss = total_loss(&pruned, &EqualityLoss, &points, &labels);
        assert!(
            pruned_loss <= full_loss + (full_loss - baseline).abs() + 1e-9,
            "pruned loss {} grew past the full-tree loss {} by more than the baseline gap {}",
            pruned_loss,
            full_loss,
            baseline
        );
    }
}
