//! Ensembles of vector-valued trees.

use std::sync::Arc;

use crate::geom::{Coord, Real};

use super::Tree;

/// A non-empty sequence of vector-valued trees whose predictions are summed.
///
/// Residual-fitted normal maps are evaluated this way: each tree predicts the
/// residual left by its predecessors, so the sum is the full estimate.
#[derive(Clone, Debug)]
pub struct VecSumEnsemble<F, C, T>(Vec<Arc<Tree<F, C, T>>>);

impl<F: Real, C: Coord<F>, T: Coord<F>> VecSumEnsemble<F, C, T> {
    /// Panics if `trees` is empty.
    pub fn new(trees: Vec<Arc<Tree<F, C, T>>>) -> Self {
        assert!(!trees.is_empty(), "ensemble requires at least one tree");
        Self(trees)
    }

    pub fn trees(&self) -> &[Arc<Tree<F, C, T>>] {
        &self.0
    }

    pub fn predict(&self, x: C) -> T {
        let mut res = *self.0[0].predict(x);
        for tree in &self.0[1..] {
            res = res + *tree.predict(x);
        }
        res
    }
}

/// Like [`VecSumEnsemble`], but the summed output is scaled to unit norm.
///
/// A zero-vector sum is returned unchanged.
#[derive(Clone, Debug)]
pub struct VecSumNormEnsemble<F, C, T>(VecSumEnsemble<F, C, T>);

impl<F: Real, C: Coord<F>, T: Coord<F>> VecSumNormEnsemble<F, C, T> {
    /// Panics if `trees` is empty.
    pub fn new(trees: Vec<Arc<Tree<F, C, T>>>) -> Self {
        Self(VecSumEnsemble::new(trees))
    }

    pub fn predict(&self, x: C) -> T {
        let res = self.0.predict(x);
        let norm = res.norm();
        if norm != F::ZERO {
            res.scale(F::ONE / norm)
        } else {
            res
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn sum_and_normalize() {
        let a = Arc::new(Tree::leaf(Vec3::new(1.0, 0.0, 0.0)));
        let b = Arc::new(Tree::leaf(Vec3::new(1.0, 2.0, 0.0)));
        let sum = VecSumEnsemble::new(vec![a.clone(), b.clone()]);
        assert_eq!(sum.predict(Vec3::zero()), Vec3::new(2.0, 2.0, 0.0));

        let norm = VecSumNormEnsemble::new(vec![a, b]);
        assert_relative_eq!(norm.predict(Vec3::zero()).norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_sum_passes_through() {
        let a = Arc::new(Tree::leaf(Vec3::new(1.0, 0.0, 0.0)));
        let b = Arc::new(Tree::leaf(Vec3::new(-1.0, 0.0, 0.0)));
        let norm = VecSumNormEnsemble::new(vec![a, b]);
        assert_eq!(norm.predict(Vec3::zero()), Vec3::zero());
    }
}
