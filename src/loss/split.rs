//! Split criteria for greedy tree construction.

use crate::geom::{Coord, Real};

/// The outcome of a minimum-split search.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SplitInfo {
    /// Number of elements kept in the less-than branch.
    pub index: usize,

    /// Total loss of both branches.
    pub loss: f64,
}

/// A decision criterion used to select the best split of sorted samples.
///
/// The threshold type `F` is only consulted for exact equality: samples whose
/// projections are bit-identical can never be separated and are grouped
/// together during the scan.
pub trait SplitLoss<F: Real, T>: Send + Sync {
    /// The value minimizing the loss of a leaf holding `labels`.
    fn predict(&self, labels: &[T]) -> T;

    /// The best split of labels sorted by their projections.
    ///
    /// `labels[i]` must correspond to `thresholds[i]`, and `thresholds` must
    /// be ascending. The result may put every sample on one side
    /// (`index == 0` or `index == len`), in which case no split reduces the
    /// loss (or none satisfies the minimum-count constraint).
    fn minimum_split(&self, labels: &[T], thresholds: &[F]) -> SplitInfo;

    /// The total loss of an already-partitioned pair of branches.
    fn split_cost(&self, less_than: &[T], greater_equal: &[T]) -> f64;
}

/// Candidate split indices: 0, each position where the threshold changes,
/// and `len`. Tied thresholds are never separated.
fn iterate_split_points<F: Real>(thresholds: &[F], mut f: impl FnMut(usize)) {
    let mut prev = None;
    for (i, &x) in thresholds.iter().enumerate() {
        if prev != Some(x) {
            f(i);
        }
        prev = Some(x);
    }
    f(thresholds.len());
}

// =============================================================================
// Entropy (boolean labels)
// =============================================================================

/// Total entropy across both branches, for boolean labels.
#[derive(Copy, Clone, Debug, Default)]
pub struct EntropySplitLoss {
    /// Reject splits leaving fewer than this many samples on either side.
    pub min_count: usize,
}

fn log_or_zero(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x.ln()
    }
}

/// Unnormalized entropy of a branch: `count * H(true fraction)`.
fn entropy(num_points: usize, num_true: usize) -> f64 {
    if num_points == 0 {
        return 0.0;
    }
    let num_false = num_points - num_true;
    let frac_true = num_true as f64 / num_points as f64;
    let frac_false = num_false as f64 / num_points as f64;
    -(num_true as f64 * log_or_zero(frac_true) + num_false as f64 * log_or_zero(frac_false))
}

impl EntropySplitLoss {
    fn allows(&self, index: usize, len: usize) -> bool {
        index == 0 || (index >= self.min_count && len - index >= self.min_count)
    }
}

impl<F: Real> SplitLoss<F, bool> for EntropySplitLoss {
    fn predict(&self, labels: &[bool]) -> bool {
        labels.iter().filter(|&&l| l).count() * 2 > labels.len()
    }

    fn minimum_split(&self, labels: &[bool], thresholds: &[F]) -> SplitInfo {
        assert_eq!(
            labels.len(),
            thresholds.len(),
            "labels and thresholds must have same length"
        );

        let mut left_sum = 0usize;
        let mut right_sum = labels.iter().filter(|&&l| l).count();

        let mut last_index = 0;
        let mut best: Option<SplitInfo> = None;
        iterate_split_points(thresholds, |i| {
            while last_index < i {
                if labels[last_index] {
                    left_sum += 1;
                    right_sum -= 1;
                }
                last_index += 1;
            }
            if !self.allows(i, labels.len()) {
                return;
            }
            let split = SplitInfo {
                index: i,
                loss: entropy(i, left_sum) + entropy(labels.len() - i, right_sum),
            };
            if best.map_or(true, |b| split.loss < b.loss) {
                best = Some(split);
            }
        });

        best.expect("split scan always visits index 0")
    }

    fn split_cost(&self, less_than: &[bool], greater_equal: &[bool]) -> f64 {
        let left_true = less_than.iter().filter(|&&l| l).count();
        let right_true = greater_equal.iter().filter(|&&l| l).count();
        entropy(less_than.len(), left_true) + entropy(greater_equal.len(), right_true)
    }
}

// =============================================================================
// Variance (vector labels)
// =============================================================================

/// Total variance across both branches, for vector labels.
///
/// Each branch contributes `count * (E[x^2] - E[x]^2).sum()`, tracked with a
/// rolling sum and sum of elementwise squares.
#[derive(Copy, Clone, Debug, Default)]
pub struct VarianceSplitLoss {
    /// Reject splits leaving fewer than this many samples on either side.
    pub min_count: usize,
}

fn branch_variance<F: Real, T: Coord<F>>(count: usize, sum: T, sq_sum: T) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let n = F::from_f64(count as f64);
    let mean = sum.scale(F::ONE / n);
    let mean_sq = sq_sum.scale(F::ONE / n);
    let var = (mean_sq - mean * mean).sum();
    (n * var).to_f64()
}

impl VarianceSplitLoss {
    fn allows(&self, index: usize, len: usize) -> bool {
        index == 0 || (index >= self.min_count && len - index >= self.min_count)
    }
}

impl<F: Real, T: Coord<F>> SplitLoss<F, T> for VarianceSplitLoss {
    fn predict(&self, labels: &[T]) -> T {
        if labels.is_empty() {
            return T::default();
        }
        let sum = labels.iter().fold(T::default(), |acc, &l| acc + l);
        sum.scale(F::ONE / F::from_f64(labels.len() as f64))
    }

    fn minimum_split(&self, labels: &[T], thresholds: &[F]) -> SplitInfo {
        assert_eq!(
            labels.len(),
            thresholds.len(),
            "labels and thresholds must have same length"
        );

        let mut left_sum = T::default();
        let mut left_sq = T::default();
        let mut right_sum = T::default();
        let mut right_sq = T::default();
        for &l in labels {
            right_sum = right_sum + l;
            right_sq = right_sq + l * l;
        }

        let mut last_index = 0;
        let mut best: Option<SplitInfo> = None;
        iterate_split_points(thresholds, |i| {
            while last_index < i {
                let l = labels[last_index];
                left_sum = left_sum + l;
                left_sq = left_sq + l * l;
                right_sum = right_sum - l;
                right_sq = right_sq - l * l;
                last_index += 1;
            }
            if !self.allows(i, labels.len()) {
                return;
            }
            let split = SplitInfo {
                index: i,
                loss: branch_variance(i, left_sum, left_sq)
                    + branch_variance(labels.len() - i, right_sum, right_sq),
            };
            if best.map_or(true, |b| split.loss < b.loss) {
                best = Some(split);
            }
        });

        best.expect("split scan always visits index 0")
    }

    fn split_cost(&self, less_than: &[T], greater_equal: &[T]) -> f64 {
        let side = |labels: &[T]| {
            let mut sum = T::default();
            let mut sq = T::default();
            for &l in labels {
                sum = sum + l;
                sq = sq + l * l;
            }
            branch_variance(labels.len(), sum, sq)
        };
        side(less_than) + side(greater_equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Vec3;
    use approx::assert_relative_eq;

    fn brute_force_entropy(labels: &[bool]) -> f64 {
        let num_true = labels.iter().filter(|&&l| l).count();
        entropy(labels.len(), num_true)
    }

    #[test]
    fn entropy_split_is_optimal() {
        // Brute-force check on every candidate index for a few label patterns.
        let cases: Vec<Vec<bool>> = vec![
            vec![false, false, true, true, true],
            vec![true, false, true, false, true, false],
            vec![false; 6],
            vec![true, true, false, false, true, true, true],
        ];
        for labels in cases {
            let thresholds: Vec<f64> = (0..labels.len()).map(|i| i as f64).collect();
            let loss = EntropySplitLoss::default();
            let best = loss.minimum_split(&labels, &thresholds);
            for i in 0..=labels.len() {
                let alt = brute_force_entropy(&labels[..i]) + brute_force_entropy(&labels[i..]);
                assert!(
                    best.loss <= alt + 1e-12,
                    "index {} beats reported best: {} < {}",
                    i,
                    alt,
                    best.loss
                );
            }
        }
    }

    #[test]
    fn entropy_groups_tied_thresholds() {
        // The perfect split at index 2 is unreachable: thresholds tie across it.
        let labels = vec![false, false, true, true];
        let thresholds = vec![0.0, 1.0, 1.0, 2.0];
        let loss = EntropySplitLoss::default();
        let best = loss.minimum_split(&labels, &thresholds);
        assert_ne!(best.index, 2);
    }

    #[test]
    fn entropy_min_count_falls_back_to_degenerate() {
        let labels = vec![false, true, true, true];
        let thresholds = vec![0.0, 1.0, 2.0, 3.0];
        let loss = EntropySplitLoss { min_count: 3 };
        let best = loss.minimum_split(&labels, &thresholds);
        // Only index 0 survives the constraint (1/3 and 2/2 and 3/1 all fail).
        assert_eq!(best.index, 0);
    }

    #[test]
    fn entropy_predict_is_majority() {
        let loss = EntropySplitLoss::default();
        assert!(SplitLoss::<f64, bool>::predict(&loss, &[true, true, false]));
        assert!(!SplitLoss::<f64, bool>::predict(&loss, &[true, false, false]));
        // An exact tie is not a majority.
        assert!(!SplitLoss::<f64, bool>::predict(&loss, &[true, false]));
    }

    #[test]
    fn variance_split_separates_clusters() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(1.0, 1.0, 1.0);
        let labels = vec![a, a, a, b, b, b];
        let thresholds = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let loss = VarianceSplitLoss::default();
        let best = loss.minimum_split(&labels, &thresholds);
        assert_eq!(best.index, 3);
        assert_relative_eq!(best.loss, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn variance_predict_is_mean() {
        let loss = VarianceSplitLoss::default();
        let labels = vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(3.0, 2.0, 0.0)];
        let mean: Vec3<f64> = SplitLoss::<f64, _>::predict(&loss, &labels);
        assert_eq!(mean, Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn variance_matches_split_cost() {
        let labels: Vec<Vec3<f64>> = (0..8)
            .map(|i| Vec3::new(i as f64, (i * i) as f64 * 0.1, -(i as f64)))
            .collect();
        let thresholds: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let loss = VarianceSplitLoss::default();
        let best = loss.minimum_split(&labels, &thresholds);
        let direct = loss.split_cost(&labels[..best.index], &labels[best.index..]);
        assert_relative_eq!(best.loss, direct, epsilon = 1e-9);
    }
}
