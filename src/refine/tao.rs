//! Tree Alternating Optimization.
//!
//! A post-order pass over the tree. Leaves are re-predicted from the samples
//! that reach them. At each branch the children are refined first (in
//! parallel, over the fork queue), then the split itself is re-learned as a
//! weighted linear classifier whose targets say which refined child predicts
//! each sample better. Every change is accepted only when it strictly lowers
//! the training loss, so a full pass can never regress.

use std::sync::Arc;

use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::debug;

use crate::build::{adaptive_resample, spawn_rngs};
use crate::fork::ForkQueue;
use crate::geom::{Coord, Polytope, Real};
use crate::loss::{total_loss, TaoLoss};
use crate::sample::HitAndRunSampler;
use crate::tree::{partition, Tree};

/// A refined tree along with the loss before and after.
///
/// `new_loss <= old_loss` always holds; when they are equal the returned
/// tree is the input tree.
#[derive(Clone, Debug)]
pub struct TaoResult<F, C, T> {
    pub tree: Arc<Tree<F, C, T>>,
    pub old_loss: f64,
    pub new_loss: f64,
}

/// One pass of Tree Alternating Optimization.
#[derive(Clone, Debug)]
pub struct Tao<F, L> {
    /// Loss to minimize.
    pub loss: L,

    /// Step size for split optimization.
    pub lr: F,

    /// L2 penalty for split optimization.
    pub weight_decay: F,

    /// Nesterov momentum coefficient.
    pub momentum: F,

    /// Optimization iterations per split.
    pub iters: usize,

    /// Worker cap for the recursive pass; 0 means one per hardware thread.
    pub concurrency: usize,

    /// Log per-split optimization details.
    pub verbose: bool,
}

impl<F: Real, L> Tao<F, L> {
    /// Refine `tree` against a dataset.
    ///
    /// The dataset is copied once; the copies are reordered during the pass.
    /// An empty dataset returns the tree unchanged.
    pub fn optimize<C, T>(
        &self,
        tree: &Arc<Tree<F, C, T>>,
        coords: &[C],
        labels: &[T],
    ) -> TaoResult<F, C, T>
    where
        C: Coord<F>,
        T: Copy + Send + Sync,
        L: TaoLoss<T>,
    {
        let mut coords = coords.to_vec();
        let mut labels = labels.to_vec();
        let queue = ForkQueue::new(self.concurrency);
        queue.run(|| self.optimize_rec(&queue, tree, &mut coords, &mut labels))
    }

    fn optimize_rec<C, T>(
        &self,
        queue: &ForkQueue,
        tree: &Arc<Tree<F, C, T>>,
        coords: &mut [C],
        labels: &mut [T],
    ) -> TaoResult<F, C, T>
    where
        C: Coord<F>,
        T: Copy + Send + Sync,
        L: TaoLoss<T>,
    {
        if coords.is_empty() {
            return TaoResult {
                tree: tree.clone(),
                old_loss: 0.0,
                new_loss: 0.0,
            };
        }

        let (axis, threshold, less_than, greater_equal) = match &**tree {
            Tree::Leaf(_) => return self.optimize_leaf(tree, coords, labels),
            Tree::Branch {
                axis,
                threshold,
                less_than,
                greater_equal,
            } => (*axis, *threshold, less_than, greater_equal),
        };

        let old_loss = total_loss(tree, &self.loss, coords, labels);

        // Reorders the node's samples around the decision boundary.
        let mid = partition(axis, threshold, coords, labels);
        let (left_result, right_result) = {
            let (left_coords, right_coords) = coords.split_at_mut(mid);
            let (left_labels, right_labels) = labels.split_at_mut(mid);
            queue.fork(
                || self.optimize_rec(queue, less_than, left_coords, left_labels),
                || self.optimize_rec(queue, greater_equal, right_coords, right_labels),
            )
        };

        // Train the split only on samples the refined children disagree
        // about, weighted by how much the choice matters.
        let mut cls_coords = Vec::new();
        let mut cls_targets = Vec::new();
        let mut cls_weights = Vec::new();
        for (c, label) in coords.iter().zip(labels.iter()) {
            let left_loss = self.loss.loss(label, left_result.tree.predict(*c));
            let right_loss = self.loss.loss(label, right_result.tree.predict(*c));
            let weight = (left_loss - right_loss).abs();
            if weight != 0.0 {
                cls_coords.push(*c);
                cls_targets.push(left_loss > right_loss);
                cls_weights.push(F::from_f64(weight));
            }
        }

        let children_changed = !Arc::ptr_eq(&left_result.tree, less_than)
            || !Arc::ptr_eq(&right_result.tree, greater_equal);

        if cls_weights.is_empty() {
            // The split cannot matter; keep it and adopt the new children if
            // they help.
            if children_changed {
                let new_tree = Arc::new(Tree::Branch {
                    axis,
                    threshold,
                    less_than: left_result.tree,
                    greater_equal: right_result.tree,
                });
                let new_loss = total_loss(&new_tree, &self.loss, coords, labels);
                if new_loss < old_loss {
                    return TaoResult {
                        tree: new_tree,
                        old_loss,
                        new_loss,
                    };
                }
            }
            return TaoResult {
                tree: tree.clone(),
                old_loss,
                new_loss: old_loss,
            };
        }

        let (new_axis, new_bias) =
            self.linear_svm(axis, -threshold, &cls_coords, &cls_targets, &cls_weights);

        let alternative = Arc::new(Tree::Branch {
            axis,
            threshold,
            less_than: left_result.tree.clone(),
            greater_equal: right_result.tree.clone(),
        });
        let alternative_loss = total_loss(&alternative, &self.loss, coords, labels);

        // A fully-decayed classifier can return a zero axis, which is not a
        // usable split.
        let (mut best_tree, mut best_loss) = (alternative, alternative_loss);
        if new_axis != C::default() {
            let learned = Arc::new(Tree::Branch {
                axis: new_axis,
                threshold: -new_bias,
                less_than: left_result.tree,
                greater_equal: right_result.tree,
            });
            let learned_loss = total_loss(&learned, &self.loss, coords, labels);
            if self.verbose {
                debug!(
                    old_loss,
                    new_loss = learned_loss,
                    alternative = alternative_loss,
                    "re-learned split"
                );
            }
            if learned_loss < best_loss {
                best_tree = learned;
                best_loss = learned_loss;
            }
        }

        if best_loss < old_loss {
            TaoResult {
                tree: best_tree,
                old_loss,
                new_loss: best_loss,
            }
        } else {
            TaoResult {
                tree: tree.clone(),
                old_loss,
                new_loss: old_loss,
            }
        }
    }

    fn optimize_leaf<C, T>(
        &self,
        tree: &Arc<Tree<F, C, T>>,
        coords: &[C],
        labels: &[T],
    ) -> TaoResult<F, C, T>
    where
        C: Coord<F>,
        T: Copy + Send + Sync,
        L: TaoLoss<T>,
    {
        let old_loss = total_loss(tree, &self.loss, coords, labels);
        let new_leaf = Arc::new(Tree::leaf(self.loss.predict(labels)));
        let new_loss = total_loss(&new_leaf, &self.loss, coords, labels);
        if new_loss < old_loss {
            TaoResult {
                tree: new_leaf,
                old_loss,
                new_loss,
            }
        } else {
            TaoResult {
                tree: tree.clone(),
                old_loss,
                new_loss: old_loss,
            }
        }
    }

    fn linear_svm<C: Coord<F>>(
        &self,
        weight: C,
        bias: F,
        coords: &[C],
        targets: &[bool],
        weights: &[F],
    ) -> (C, F) {
        use super::classifier::{line_search_scale, linear_classification, HingeLoss, SgdOptimizer};

        let scale = line_search_scale(weight, bias, coords, targets, &HingeLoss);
        let weight = weight.scale(scale);
        let bias = bias * scale;

        let mut opt = SgdOptimizer::new(self.lr, self.weight_decay, self.momentum, self.iters);
        let result = linear_classification(
            weight,
            bias,
            coords,
            targets,
            weights,
            &HingeLoss,
            &mut opt,
            self.iters,
        );

        if self.verbose {
            debug!(
                init_loss = result.init_loss.to_f64(),
                final_loss = result.final_loss.to_f64(),
                init_acc = result.init_acc.to_f64(),
                final_acc = result.final_acc.to_f64(),
                "SVM training"
            );
        }

        (result.weight, result.bias)
    }
}

// =============================================================================
// Adaptive variant
// =============================================================================

/// TAO with in-cell resampling.
///
/// Before partitioning at a node, the cell's dataset is topped up to
/// `min_samples` points via hit-and-run sampling inside the polytope
/// accumulated from the ancestors' splits, labeled by the oracle. Each
/// recursion works on its own copy of the data.
pub struct AdaptiveTao<'a, F, L, O> {
    pub tao: Tao<F, L>,
    pub sampler: HitAndRunSampler<F>,
    pub oracle: &'a O,
    pub min_samples: usize,
}

impl<'a, F: Real, L, O> AdaptiveTao<'a, F, L, O> {
    /// Refine `tree` over the cell described by `bounds`.
    pub fn optimize<C, T>(
        &self,
        tree: &Arc<Tree<F, C, T>>,
        bounds: &Polytope<F, C>,
        coords: Vec<C>,
        labels: Vec<T>,
        rng: &mut Xoshiro256PlusPlus,
    ) -> TaoResult<F, C, T>
    where
        C: Coord<F>,
        T: Copy + Send + Sync,
        L: TaoLoss<T>,
        O: Fn(C) -> T + Sync,
    {
        let queue = ForkQueue::new(self.tao.concurrency);
        queue.run(|| self.optimize_rec(&queue, tree, bounds, coords, labels, rng))
    }

    fn optimize_rec<C, T>(
        &self,
        queue: &ForkQueue,
        tree: &Arc<Tree<F, C, T>>,
        bounds: &Polytope<F, C>,
        mut coords: Vec<C>,
        mut labels: Vec<T>,
        rng: &mut Xoshiro256PlusPlus,
    ) -> TaoResult<F, C, T>
    where
        C: Coord<F>,
        T: Copy + Send + Sync,
        L: TaoLoss<T>,
        O: Fn(C) -> T + Sync,
    {
        if !coords.is_empty() {
            adaptive_resample(
                bounds,
                &mut coords,
                &mut labels,
                self.oracle,
                &self.sampler,
                self.min_samples,
                queue,
                rng,
            );
        }

        if coords.is_empty() {
            return TaoResult {
                tree: tree.clone(),
                old_loss: 0.0,
                new_loss: 0.0,
            };
        }

        let (axis, threshold, less_than, greater_equal) = match &**tree {
            Tree::Leaf(_) => return self.tao.optimize_leaf(tree, &coords, &labels),
            Tree::Branch {
                axis,
                threshold,
                less_than,
                greater_equal,
            } => (*axis, *threshold, less_than, greater_equal),
        };

        let old_loss = total_loss(tree, &self.tao.loss, &coords, &labels);

        let mid = partition(axis, threshold, &mut coords, &mut labels);
        let left_bounds = bounds.constrain(axis, threshold);
        let right_bounds = bounds.constrain(-axis, -threshold);
        let mut child_rngs = spawn_rngs(rng, 2);
        let mut right_rng = child_rngs.pop().expect("two rngs");
        let mut left_rng = child_rngs.pop().expect("two rngs");

        let left_coords = coords[..mid].to_vec();
        let left_labels = labels[..mid].to_vec();
        let right_coords = coords[mid..].to_vec();
        let right_labels = labels[mid..].to_vec();
        let (left_result, right_result) = queue.fork(
            || {
                self.optimize_rec(
                    queue,
                    less_than,
                    &left_bounds,
                    left_coords,
                    left_labels,
                    &mut left_rng,
                )
            },
            || {
                self.optimize_rec(
                    queue,
                    greater_equal,
                    &right_bounds,
                    right_coords,
                    right_labels,
                    &mut right_rng,
                )
            },
        );

        let mut cls_coords = Vec::new();
        let mut cls_targets = Vec::new();
        let mut cls_weights = Vec::new();
        for (c, label) in coords.iter().zip(labels.iter()) {
            let left_loss = self.tao.loss.loss(label, left_result.tree.predict(*c));
            let right_loss = self.tao.loss.loss(label, right_result.tree.predict(*c));
            let weight = (left_loss - right_loss).abs();
            if weight != 0.0 {
                cls_coords.push(*c);
                cls_targets.push(left_loss > right_loss);
                cls_weights.push(F::from_f64(weight));
            }
        }

        let children_changed = !Arc::ptr_eq(&left_result.tree, less_than)
            || !Arc::ptr_eq(&right_result.tree, greater_equal);

        if cls_weights.is_empty() {
            if children_changed {
                let new_tree = Arc::new(Tree::Branch {
                    axis,
                    threshold,
                    less_than: left_result.tree,
                    greater_equal: right_result.tree,
                });
                let new_loss = total_loss(&new_tree, &self.tao.loss, &coords, &labels);
                if new_loss < old_loss {
                    return TaoResult {
                        tree: new_tree,
                        old_loss,
                        new_loss,
                    };
                }
            }
            return TaoResult {
                tree: tree.clone(),
                old_loss,
                new_loss: old_loss,
            };
        }

        let (new_axis, new_bias) =
            self.tao
                .linear_svm(axis, -threshold, &cls_coords, &cls_targets, &cls_weights);

        let alternative = Arc::new(Tree::Branch {
            axis,
            threshold,
            less_than: left_result.tree.clone(),
            greater_equal: right_result.tree.clone(),
        });
        let alternative_loss = total_loss(&alternative, &self.tao.loss, &coords, &labels);

        let (mut best_tree, mut best_loss) = (alternative, alternative_loss);
        if new_axis != C::default() {
            let learned = Arc::new(Tree::Branch {
                axis: new_axis,
                threshold: -new_bias,
                less_than: left_result.tree,
                greater_equal: right_result.tree,
            });
            let learned_loss = total_loss(&learned, &self.tao.loss, &coords, &labels);
            if learned_loss < best_loss {
                best_tree = learned;
                best_loss = learned_loss;
            }
        }

        if best_loss < old_loss {
            TaoResult {
                tree: best_tree,
                old_loss,
                new_loss: best_loss,
            }
        } else {
            TaoResult {
                tree: tree.clone(),
                old_loss,
                new_loss: old_loss,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::greedy_tree;
    use crate::geom::Vec3;
    use crate::loss::{EntropySplitLoss, EqualityLoss};
    use rand::{Rng, SeedableRng};

    fn sphere_dataset(n: usize, seed: u64) -> (Vec<Vec3<f64>>, Vec<bool>) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let center = Vec3::new(0.3, 0.7, 0.5);
        let points: Vec<Vec3<f64>> = (0..n)
            .map(|_| Vec3::new(rng.gen(), rng.gen(), rng.gen()))
            .collect();
        let labels = points.iter().map(|p| p.dist(center) < 0.5).collect();
        (points, labels)
    }

    fn accuracy(tree: &Tree<f64, Vec3<f64>, bool>, points: &[Vec3<f64>], labels: &[bool]) -> f64 {
        let correct = points
            .iter()
            .zip(labels.iter())
            .filter(|(p, l)| *tree.predict(**p) == **l)
            .count();
        correct as f64 / points.len() as f64
    }

    #[test]
    fn tao_improves_greedy_tree() {
        let (points, labels) = sphere_dataset(5000, 1337);
        let axes = [Vec3::x_axis(), Vec3::y_axis(), Vec3::z_axis()];
        let tree = Arc::new(greedy_tree(
            &axes,
            &points,
            &labels,
            &EntropySplitLoss::default(),
            0,
            4,
        ));
        let before = accuracy(&tree, &points, &labels);

        let tao = Tao {
            loss: EqualityLoss,
            lr: 1e-2,
            weight_decay: 1e-3,
            momentum: 0.9,
            iters: 1000,
            concurrency: 0,
            verbose: false,
        };
        let result = tao.optimize(&tree, &points, &labels);

        assert!(
            result.new_loss < result.old_loss,
            "expected improvement, got {} -> {}",
            result.old_loss,
            result.new_loss
        );
        let after = accuracy(&result.tree, &points, &labels);
        assert!(after > before, "accuracy {} -> {}", before, after);
    }

    #[test]
    fn tao_is_a_no_op_on_perfect_trees() {
        let points: Vec<Vec3<f64>> = (0..100)
            .map(|i| Vec3::new(i as f64 / 100.0, 0.0, 0.0))
            .collect();
        let labels: Vec<bool> = points.iter().map(|p| p.x >= 0.5).collect();
        let tree: Arc<Tree<f64, Vec3<f64>, bool>> = Arc::new(Tree::branch(
            Vec3::x_axis(),
            0.5,
            Tree::leaf(false),
            Tree::leaf(true),
        ));

        let tao = Tao {
            loss: EqualityLoss,
            lr: 1e-2,
            weight_decay: 1e-3,
            momentum: 0.9,
            iters: 50,
            concurrency: 1,
            verbose: false,
        };
        let result = tao.optimize(&tree, &points, &labels);
        assert_eq!(result.old_loss, 0.0);
        assert_eq!(result.new_loss, 0.0);
        assert!(Arc::ptr_eq(&result.tree, &tree));
    }

    #[test]
    fn adaptive_tao_does_not_regress() {
        let oracle = |p: Vec3<f64>| p.dist(Vec3::new(0.3, 0.7, 0.5)) < 0.5;
        let (points, labels) = sphere_dataset(400, 77);
        let axes = [Vec3::x_axis(), Vec3::y_axis(), Vec3::z_axis()];
        let tree = Arc::new(greedy_tree(
            &axes,
            &points,
            &labels,
            &EntropySplitLoss::default(),
            1,
            3,
        ));

        let adaptive = AdaptiveTao {
            tao: Tao {
                loss: EqualityLoss,
                lr: 1e-2,
                weight_decay: 1e-3,
                momentum: 0.9,
                iters: 100,
                concurrency: 1,
                verbose: false,
            },
            sampler: crate::sample::HitAndRunSampler::new(10),
            oracle: &oracle,
            min_samples: 200,
        };
        let bounds = Polytope::cube(Vec3::splat(0.0), Vec3::splat(1.0));
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(78);
        let result = adaptive.optimize(&tree, &bounds, points.clone(), labels.clone(), &mut rng);

        assert!(result.new_loss <= result.old_loss);
        // The refined tree must not be worse on the original dataset either.
        let before = total_loss(&tree, &EqualityLoss, &points, &labels);
        let after = total_loss(&result.tree, &EqualityLoss, &points, &labels);
        assert!(after <= before, "adaptive TAO regressed: {} -> {}", before, after);
    }

    #[test]
    fn tao_empty_dataset_returns_input() {
        let tree: Arc<Tree<f64, Vec3<f64>, bool>> = Arc::new(Tree::leaf(true));
        let tao = Tao {
            loss: EqualityLoss,
            lr: 1e-2,
            weight_decay: 0.0,
            momentum: 0.0,
            iters: 10,
            concurrency: 1,
            verbose: false,
        };
        let result = tao.optimize(&tree, &[], &[]);
        assert!(Arc::ptr_eq(&result.tree, &tree));
        assert_eq!(result.new_loss, 0.0);
    }
}
