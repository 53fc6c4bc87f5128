//! The tree data model.
//!
//! [`Tree`] is a binary tree of oblique half-space tests. An internal node
//! routes a point to its `greater_equal` child when `point · axis >=
//! threshold` and to `less_than` otherwise; a leaf carries a value of the
//! leaf type `T`. Children are reference-counted so [`Tree::replace`] can
//! share unchanged subtrees, and a published tree is immutable: readers may
//! query it from any number of threads.

mod ensemble;

pub use ensemble::{VecSumEnsemble, VecSumNormEnsemble};

use std::sync::Arc;

use crate::geom::{Coord, Real, Vec3};
use crate::loss::TaoLoss;

/// An oblique decision tree with leaf values of type `T`.
#[derive(Clone, Debug, PartialEq)]
pub enum Tree<F, C, T> {
    Leaf(T),
    Branch {
        /// Split direction; never the zero vector.
        axis: C,
        threshold: F,
        less_than: Arc<Tree<F, C, T>>,
        greater_equal: Arc<Tree<F, C, T>>,
    },
}

/// Boolean occupancy tree over 3D points.
pub type SolidTree = Tree<f64, Vec3<f64>, bool>;

/// Vector-valued tree over 3D points (e.g. surface normals).
pub type CoordTree = Tree<f64, Vec3<f64>, Vec3<f64>>;

impl<F: Real, C: Coord<F>, T> Tree<F, C, T> {
    pub fn leaf(value: T) -> Self {
        Tree::Leaf(value)
    }

    pub fn branch(
        axis: C,
        threshold: F,
        less_than: impl Into<Arc<Self>>,
        greater_equal: impl Into<Arc<Self>>,
    ) -> Self {
        debug_assert!(axis != C::default(), "branch axis must be non-zero");
        Tree::Branch {
            axis,
            threshold,
            less_than: less_than.into(),
            greater_equal: greater_equal.into(),
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Tree::Leaf(_))
    }

    /// The leaf value a point routes to.
    pub fn predict(&self, point: C) -> &T {
        let mut node = self;
        loop {
            match node {
                Tree::Leaf(value) => return value,
                Tree::Branch {
                    axis,
                    threshold,
                    less_than,
                    greater_equal,
                } => {
                    node = if point.dot(*axis) < *threshold {
                        less_than
                    } else {
                        greater_equal
                    };
                }
            }
        }
    }

    pub fn num_leaves(&self) -> usize {
        match self {
            Tree::Leaf(_) => 1,
            Tree::Branch {
                less_than,
                greater_equal,
                ..
            } => less_than.num_leaves() + greater_equal.num_leaves(),
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Tree::Leaf(_) => 0,
            Tree::Branch {
                less_than,
                greater_equal,
                ..
            } => 1 + less_than.depth().max(greater_equal.depth()),
        }
    }

    /// A structurally identical tree with every leaf mapped through `f`.
    pub fn map_leaves<U, M: Fn(&T) -> U + Copy>(&self, f: M) -> Tree<F, C, U> {
        match self {
            Tree::Leaf(value) => Tree::Leaf(f(value)),
            Tree::Branch {
                axis,
                threshold,
                less_than,
                greater_equal,
            } => Tree::Branch {
                axis: *axis,
                threshold: *threshold,
                less_than: Arc::new(less_than.map_leaves(f)),
                greater_equal: Arc::new(greater_equal.map_leaves(f)),
            },
        }
    }
}

impl<F: Real, C: Coord<F>, T: Clone> Tree<F, C, T> {
    /// Multiply every threshold by `s`, leaving axes unchanged.
    ///
    /// The result predicts at `x` what the receiver predicts at `x / s`.
    pub fn scale(&self, s: F) -> Self {
        match self {
            Tree::Leaf(value) => Tree::Leaf(value.clone()),
            Tree::Branch {
                axis,
                threshold,
                less_than,
                greater_equal,
            } => Tree::Branch {
                axis: *axis,
                threshold: *threshold * s,
                less_than: Arc::new(less_than.scale(s)),
                greater_equal: Arc::new(greater_equal.scale(s)),
            },
        }
    }

    /// Add `axis · offset` to every threshold.
    ///
    /// The result predicts at `x` what the receiver predicts at `x - offset`.
    pub fn translate(&self, offset: C) -> Self {
        match self {
            Tree::Leaf(value) => Tree::Leaf(value.clone()),
            Tree::Branch {
                axis,
                threshold,
                less_than,
                greater_equal,
            } => Tree::Branch {
                axis: *axis,
                threshold: *threshold + axis.dot(offset),
                less_than: Arc::new(less_than.translate(offset)),
                greater_equal: Arc::new(greater_equal.translate(offset)),
            },
        }
    }

    /// Swap the subtree `old` (matched by pointer identity) for `new`.
    ///
    /// Returns the new root and whether the target was found; unchanged
    /// subtrees are shared with the receiver. The root itself is a valid
    /// target.
    pub fn replace(self: &Arc<Self>, old: &Arc<Self>, new: &Arc<Self>) -> (Arc<Self>, bool) {
        if Arc::ptr_eq(self, old) {
            return (new.clone(), true);
        }
        match &**self {
            Tree::Leaf(_) => (self.clone(), false),
            Tree::Branch {
                axis,
                threshold,
                less_than,
                greater_equal,
            } => {
                let (lt, found) = less_than.replace(old, new);
                if found {
                    return (
                        Arc::new(Tree::Branch {
                            axis: *axis,
                            threshold: *threshold,
                            less_than: lt,
                            greater_equal: greater_equal.clone(),
                        }),
                        true,
                    );
                }
                let (ge, found) = greater_equal.replace(old, new);
                if found {
                    (
                        Arc::new(Tree::Branch {
                            axis: *axis,
                            threshold: *threshold,
                            less_than: less_than.clone(),
                            greater_equal: ge,
                        }),
                        true,
                    )
                } else {
                    (self.clone(), false)
                }
            }
        }
    }
}

impl<F: Real, C: Coord<F>, T: Copy> Tree<F, C, T> {
    /// Collapse branches that the sample set cannot justify.
    ///
    /// Post-order: a branch whose samples all route to one child becomes that
    /// child, and a branch is replaced by a child whose standalone loss over
    /// the branch's samples is no worse than keeping the split. `points` and
    /// `labels` are reordered in place.
    pub fn simplify<L: TaoLoss<T>>(
        self: &Arc<Self>,
        points: &mut [C],
        labels: &mut [T],
        loss: &L,
    ) -> Arc<Self> {
        let (axis, threshold, less_than, greater_equal) = match &**self {
            Tree::Leaf(_) => return self.clone(),
            Tree::Branch {
                axis,
                threshold,
                less_than,
                greater_equal,
            } => (*axis, *threshold, less_than, greater_equal),
        };

        let mid = partition(axis, threshold, points, labels);
        if mid == 0 {
            return greater_equal.simplify(points, labels, loss);
        } else if mid == points.len() {
            return less_than.simplify(points, labels, loss);
        }

        let (lt, ge) = {
            let (lp, rp) = points.split_at_mut(mid);
            let (ll, rl) = labels.split_at_mut(mid);
            (
                less_than.simplify(lp, ll, loss),
                greater_equal.simplify(rp, rl, loss),
            )
        };

        let eval = |tree: &Self| -> f64 {
            points
                .iter()
                .zip(labels.iter())
                .map(|(&p, l)| loss.loss(l, tree.predict(p)))
                .sum()
        };
        let lt_loss = eval(&lt);
        let ge_loss = eval(&ge);
        let kept = Arc::new(Tree::Branch {
            axis,
            threshold,
            less_than: lt.clone(),
            greater_equal: ge.clone(),
        });
        let kept_loss = eval(&kept);

        if lt_loss <= kept_loss && lt_loss <= ge_loss {
            lt
        } else if ge_loss <= kept_loss {
            ge
        } else {
            kept
        }
    }
}

/// Reorder `points` and `labels` in place so all samples with
/// `point · axis < threshold` precede the rest; returns the boundary index.
///
/// The (point, label) pairing is preserved as a multiset.
pub fn partition<F: Real, C: Coord<F>, T>(
    axis: C,
    threshold: F,
    points: &mut [C],
    labels: &mut [T],
) -> usize {
    debug_assert_eq!(points.len(), labels.len());
    let mut num_right = 0;
    let mut i = 0;
    while i + num_right < points.len() {
        if points[i].dot(axis) >= threshold {
            num_right += 1;
            let end = points.len() - num_right;
            points.swap(i, end);
            labels.swap(i, end);
        } else {
            i += 1;
        }
    }
    points.len() - num_right
}

/// A tree together with the axis-aligned box over which it is meaningful.
///
/// The box is not enforced by the tree itself; ray and sphere queries treat
/// it as the universe.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundedTree<F, C, T> {
    pub min: C,
    pub max: C,
    pub tree: Arc<Tree<F, C, T>>,
}

/// Bounded boolean occupancy tree.
pub type BoundedSolidTree = BoundedTree<f64, Vec3<f64>, bool>;

impl<F: Real, C: Coord<F>, T: Clone> BoundedTree<F, C, T> {
    pub fn scale(&self, s: F) -> Self {
        Self {
            min: self.min.scale(s),
            max: self.max.scale(s),
            tree: Arc::new(self.tree.scale(s)),
        }
    }

    pub fn translate(&self, offset: C) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
            tree: Arc::new(self.tree.translate(offset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::EqualityLoss;

    fn string_tree() -> Tree<f64, Vec3<f64>, &'static str> {
        Tree::branch(
            Vec3::z_axis(),
            0.5,
            Tree::leaf("left"),
            Tree::leaf("right"),
        )
    }

    #[test]
    fn predict_uses_strict_less_than() {
        let tree = string_tree();
        assert_eq!(*tree.predict(Vec3::new(0.0, 0.0, 0.0)), "left");
        assert_eq!(*tree.predict(Vec3::new(0.0, 0.0, 0.499999)), "left");
        assert_eq!(*tree.predict(Vec3::new(0.0, 0.0, 0.5)), "right");
        assert_eq!(*tree.predict(Vec3::new(0.0, 0.0, 0.50001)), "right");
    }

    #[test]
    fn num_leaves_and_depth() {
        let tree: SolidTree = Tree::branch(
            Vec3::x_axis(),
            0.0,
            Tree::branch(Vec3::y_axis(), 0.0, Tree::leaf(true), Tree::leaf(false)),
            Tree::leaf(true),
        );
        assert_eq!(tree.num_leaves(), 3);
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn scale_and_translate_shift_thresholds() {
        let tree: SolidTree =
            Tree::branch(Vec3::x_axis(), 1.0, Tree::leaf(false), Tree::leaf(true));

        let scaled = tree.scale(2.0);
        assert!(!*scaled.predict(Vec3::new(1.5, 0.0, 0.0)));
        assert!(*scaled.predict(Vec3::new(2.0, 0.0, 0.0)));

        let moved = tree.translate(Vec3::new(3.0, 0.0, 0.0));
        assert!(!*moved.predict(Vec3::new(3.5, 0.0, 0.0)));
        assert!(*moved.predict(Vec3::new(4.0, 0.0, 0.0)));
    }

    #[test]
    fn replace_swaps_subtree() {
        let target: Arc<SolidTree> = Arc::new(Tree::leaf(false));
        let root: Arc<SolidTree> = Arc::new(Tree::Branch {
            axis: Vec3::x_axis(),
            threshold: 0.0,
            less_than: target.clone(),
            greater_equal: Arc::new(Tree::leaf(true)),
        });

        let with: Arc<SolidTree> = Arc::new(Tree::leaf(true));
        let (updated, found) = root.replace(&target, &with);
        assert!(found);
        assert!(*updated.predict(Vec3::new(-1.0, 0.0, 0.0)));

        // The root is a valid target too.
        let (whole, found) = root.replace(&root, &with);
        assert!(found);
        assert!(whole.is_leaf());

        // An unrelated node is not found.
        let stranger: Arc<SolidTree> = Arc::new(Tree::leaf(false));
        let (same, found) = root.replace(&stranger, &with);
        assert!(!found);
        assert!(Arc::ptr_eq(&same, &root));
    }

    #[test]
    fn partition_preserves_pairs() {
        let axis = Vec3::new(1.0, -1.0, 0.0);
        let threshold = 0.1;
        let mut points: Vec<Vec3<f64>> = (0..30)
            .map(|i| {
                let t = i as f64 * 0.7;
                Vec3::new(t.sin(), t.cos(), (t * 0.3).sin())
            })
            .collect();
        let mut labels: Vec<usize> = (0..30).collect();
        let original: Vec<(Vec3<f64>, usize)> =
            points.iter().copied().zip(labels.iter().copied()).collect();

        let mid = partition(axis, threshold, &mut points, &mut labels);

        for (i, p) in points.iter().enumerate() {
            let decision = p.dot(axis) >= threshold;
            assert_eq!(decision, i >= mid);
        }
        let mut seen: Vec<(Vec3<f64>, usize)> =
            points.iter().copied().zip(labels.iter().copied()).collect();
        for pair in original {
            let at = seen
                .iter()
                .position(|&other| other == pair)
                .expect("pair lost by partition");
            seen.swap_remove(at);
        }
        assert!(seen.is_empty());
    }

    #[test]
    fn simplify_collapses_unused_branch() {
        // The x >= 10 side is unreachable for points in the unit box.
        let dead: Arc<SolidTree> = Arc::new(Tree::branch(
            Vec3::x_axis(),
            10.0,
            Tree::leaf(true),
            Tree::leaf(false),
        ));
        let root: Arc<SolidTree> = Arc::new(Tree::Branch {
            axis: Vec3::y_axis(),
            threshold: 0.5,
            less_than: dead,
            greater_equal: Arc::new(Tree::leaf(false)),
        });

        let mut points: Vec<Vec3<f64>> = (0..20)
            .map(|i| Vec3::new((i as f64) / 20.0, (i as f64) / 20.0, 0.0))
            .collect();
        let mut labels: Vec<bool> = points.iter().map(|p| p.y < 0.5).collect();

        let simplified = root.simplify(&mut points, &mut labels, &EqualityLoss);
        assert!(simplified.num_leaves() <= root.num_leaves());
        for (p, l) in points.iter().zip(labels.iter()) {
            assert_eq!(simplified.predict(*p), l);
        }
    }

    #[test]
    fn map_leaves_keeps_structure() {
        let tree = string_tree();
        let mapped = tree.map_leaves(|s| s.len());
        assert_eq!(*mapped.predict(Vec3::zero()), 4);
        assert_eq!(*mapped.predict(Vec3::new(0.0, 0.0, 1.0)), 5);
        assert_eq!(mapped.num_leaves(), tree.num_leaves());
    }
}
