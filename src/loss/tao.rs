//! Per-sample losses for refinement and pruning.

use crate::geom::{Coord, Real};
use crate::tree::Tree;

/// A loss computed between a label and a leaf prediction of the same type.
pub trait TaoLoss<T>: Send + Sync {
    /// The optimal leaf output for a list of labels.
    fn predict(&self, labels: &[T]) -> T;

    /// A non-negative scalar loss for the pair.
    fn loss(&self, label: &T, prediction: &T) -> f64;
}

/// 0/1 loss; the leaf prediction is the mode.
///
/// Ties between modes break toward the value seen first, so the prediction is
/// deterministic for a fixed label order.
#[derive(Copy, Clone, Debug, Default)]
pub struct EqualityLoss;

impl<T: PartialEq + Copy + Default + Send + Sync> TaoLoss<T> for EqualityLoss {
    fn predict(&self, labels: &[T]) -> T {
        // Insertion-ordered counting; labels are few distinct values in
        // practice (booleans), so the linear scan is fine.
        let mut values: Vec<(T, usize)> = Vec::new();
        for label in labels {
            match values.iter_mut().find(|(v, _)| v == label) {
                Some((_, count)) => *count += 1,
                None => values.push((*label, 1)),
            }
        }
        let max_count = values.iter().map(|&(_, c)| c).max().unwrap_or(0);
        values
            .into_iter()
            .find(|&(_, c)| c == max_count)
            .map(|(v, _)| v)
            .unwrap_or_default()
    }

    #[inline]
    fn loss(&self, label: &T, prediction: &T) -> f64 {
        if label == prediction {
            0.0
        } else {
            1.0
        }
    }
}

/// Squared Euclidean error; the leaf prediction is the mean.
#[derive(Copy, Clone, Debug, Default)]
pub struct SquaredErrorLoss;

impl<T: Coord<f64>> TaoLoss<T> for SquaredErrorLoss {
    fn predict(&self, labels: &[T]) -> T {
        if labels.is_empty() {
            return T::default();
        }
        let sum = labels.iter().fold(T::default(), |acc, &l| acc + l);
        sum.scale(<f64 as Real>::ONE / <f64 as Real>::from_f64(labels.len() as f64))
    }

    #[inline]
    fn loss(&self, label: &T, prediction: &T) -> f64 {
        (*label - *prediction).norm_squared().to_f64()
    }
}

/// Sum of `loss(label, tree.predict(point))` over the dataset.
pub fn total_loss<F: Real, C: Coord<F>, T, L: TaoLoss<T>>(
    tree: &Tree<F, C, T>,
    loss: &L,
    points: &[C],
    labels: &[T],
) -> f64 {
    points
        .iter()
        .zip(labels.iter())
        .map(|(&p, l)| loss.loss(l, tree.predict(p)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn equality_predict_is_mode() {
        assert!(TaoLoss::<bool>::predict(&EqualityLoss, &[true, false, true]));
        assert_eq!(TaoLoss::<u8>::predict(&EqualityLoss, &[3, 1, 1, 3, 1]), 1);
    }

    #[test]
    fn equality_tie_breaks_by_first_seen() {
        assert_eq!(TaoLoss::<u8>::predict(&EqualityLoss, &[2, 7, 7, 2]), 2);
        assert_eq!(TaoLoss::<u8>::predict(&EqualityLoss, &[7, 2, 2, 7]), 7);
    }

    #[test]
    fn equality_empty_is_default() {
        assert!(!TaoLoss::<bool>::predict(&EqualityLoss, &[]));
    }

    #[test]
    fn squared_error_mean_and_loss() {
        let labels = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 4.0, 0.0)];
        let mean: Vec3<f64> = TaoLoss::predict(&SquaredErrorLoss, &labels);
        assert_eq!(mean, Vec3::new(1.0, 2.0, 0.0));
        assert_relative_eq!(
            TaoLoss::loss(&SquaredErrorLoss, &labels[0], &mean),
            5.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn total_loss_sums_over_dataset() {
        let tree: crate::tree::SolidTree =
            Tree::branch(Vec3::x_axis(), 0.5, Tree::leaf(false), Tree::leaf(true));
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.2, 0.0, 0.0),
        ];
        let labels = vec![false, true, true];
        assert_relative_eq!(total_loss(&tree, &EqualityLoss, &points, &labels), 1.0);
    }
}
