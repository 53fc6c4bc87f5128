//! Weighted linear classification by momentum SGD.
//!
//! TAO re-learns each split as a binary classifier: hinge loss, Nesterov
//! momentum, linear learning-rate annealing, and a line-search pre-scaling
//! step that puts the warm-start weights at a useful magnitude before any
//! gradient is taken.

use crate::geom::{Coord, Real};

// =============================================================================
// Losses
// =============================================================================

/// A margin loss over a scalar prediction and boolean target.
pub trait ClassifierLoss<F: Real>: Send + Sync {
    /// Returns the loss and the descent direction with respect to the
    /// prediction (the negated gradient, so optimizers add it).
    fn loss_and_grad(&self, pred: F, target: bool) -> (F, F);
}

/// Hinge loss: `max(0, 1 - t * p)` for targets in `{-1, +1}`.
#[derive(Copy, Clone, Debug, Default)]
pub struct HingeLoss;

impl<F: Real> ClassifierLoss<F> for HingeLoss {
    #[inline]
    fn loss_and_grad(&self, pred: F, target: bool) -> (F, F) {
        if target && pred < F::ONE {
            (F::ONE - pred, F::ONE)
        } else if !target && pred > -F::ONE {
            (pred + F::ONE, -F::ONE)
        } else {
            (F::ZERO, F::ZERO)
        }
    }
}

// =============================================================================
// Optimizer
// =============================================================================

/// A first-order optimizer over a weight vector and bias.
pub trait LinearOptimizer<F: Real, C: Coord<F>> {
    fn init(&mut self, weight: C, bias: F);

    /// Consume one descent-direction pair and return the updated parameters.
    fn step(&mut self, weight_grad: C, bias_grad: F) -> (C, F);
}

/// SGD with Nesterov momentum, L2 weight decay, and linear LR annealing.
#[derive(Clone, Debug)]
pub struct SgdOptimizer<F, C> {
    pub lr: F,
    pub weight_decay: F,
    pub momentum: F,

    /// When non-zero, the learning rate anneals linearly to zero over this
    /// many steps.
    pub anneal_iters: usize,

    weight: C,
    bias: F,
    iter: usize,
    momentum_w: C,
    momentum_b: F,
}

impl<F: Real, C: Coord<F>> SgdOptimizer<F, C> {
    pub fn new(lr: F, weight_decay: F, momentum: F, anneal_iters: usize) -> Self {
        Self {
            lr,
            weight_decay,
            momentum,
            anneal_iters,
            weight: C::default(),
            bias: F::ZERO,
            iter: 0,
            momentum_w: C::default(),
            momentum_b: F::ZERO,
        }
    }
}

impl<F: Real, C: Coord<F>> LinearOptimizer<F, C> for SgdOptimizer<F, C> {
    fn init(&mut self, weight: C, bias: F) {
        self.weight = weight;
        self.bias = bias;
        self.iter = 0;
    }

    fn step(&mut self, weight_grad: C, bias_grad: F) -> (C, F) {
        let half = F::from_f64(0.5);
        let weight_grad = weight_grad + self.weight.scale(-half * self.weight_decay);
        let bias_grad = bias_grad - half * self.bias * self.weight_decay;

        if self.iter == 0 {
            self.momentum_w = weight_grad;
            self.momentum_b = bias_grad;
        } else {
            self.momentum_w = self.momentum_w.scale(self.momentum) + weight_grad;
            self.momentum_b = self.momentum_b * self.momentum + bias_grad;
        }

        // Nesterov update: the effective direction is grad + mu * momentum.
        let weight_grad = weight_grad + self.momentum_w.scale(self.momentum);
        let bias_grad = bias_grad + self.momentum_b * self.momentum;

        let mut lr = self.lr;
        if self.anneal_iters != 0 {
            lr *= F::from_f64((self.anneal_iters - self.iter) as f64)
                / F::from_f64(self.anneal_iters as f64);
        }
        self.weight = self.weight + weight_grad.scale(lr);
        self.bias += bias_grad * lr;
        self.iter += 1;

        (self.weight, self.bias)
    }
}

// =============================================================================
// Line search
// =============================================================================

/// Find the scalar `s` minimizing the total loss of `s * (w . x + b)`.
///
/// Doubles from 1e-5 while the loss keeps improving (capped at 1e5 and at
/// the first non-finite value), then runs 16 rounds of section search in
/// `[s/2, 2s]`.
pub fn line_search_scale<F: Real, C: Coord<F>, L: ClassifierLoss<F>>(
    weight: C,
    bias: F,
    coords: &[C],
    targets: &[bool],
    loss: &L,
) -> F {
    let preds: Vec<F> = coords.iter().map(|&c| weight.dot(c) + bias).collect();
    let eval = |s: F| -> F {
        let mut total = F::ZERO;
        for (&pred, &target) in preds.iter().zip(targets.iter()) {
            total += loss.loss_and_grad(s * pred, target).0;
        }
        total
    };

    let mut s = F::from_f64(1e-5);
    let mut best = eval(s);
    loop {
        let s2 = s + s;
        if s2.to_f64() > 1e5 {
            break;
        }
        let l2 = eval(s2);
        if !l2.is_finite() || l2 >= best {
            break;
        }
        s = s2;
        best = l2;
    }

    let half = F::from_f64(0.5);
    let third = F::from_f64(1.0 / 3.0);
    let mut lo = s * half;
    let mut hi = s + s;
    for _ in 0..16 {
        let gap = (hi - lo) * third;
        let m1 = lo + gap;
        let m2 = hi - gap;
        if eval(m1) < eval(m2) {
            hi = m2;
        } else {
            lo = m1;
        }
    }
    (lo + hi) * half
}

// =============================================================================
// Training loop
// =============================================================================

/// The outcome of [`linear_classification`].
#[derive(Copy, Clone, Debug)]
pub struct LinearClassification<F, C> {
    pub weight: C,
    pub bias: F,
    pub init_loss: F,
    pub final_loss: F,
    pub init_acc: F,
    pub final_acc: F,
}

/// Train a weighted binary classifier from a warm start.
///
/// Sample weights are normalized to sum to one before gradients are
/// averaged; zero-weight samples are skipped entirely. When every weight is
/// zero the warm start is returned unchanged.
#[allow(clippy::too_many_arguments)]
pub fn linear_classification<F, C, L, O>(
    init_weight: C,
    init_bias: F,
    coords: &[C],
    targets: &[bool],
    weights: &[F],
    loss_fn: &L,
    opt: &mut O,
    iters: usize,
) -> LinearClassification<F, C>
where
    F: Real,
    C: Coord<F>,
    L: ClassifierLoss<F>,
    O: LinearOptimizer<F, C>,
{
    let mut w = init_weight;
    let mut b = init_bias;
    opt.init(w, b);

    let mut total_weight = F::ZERO;
    for &x in weights {
        total_weight += x;
    }
    if total_weight == F::ZERO {
        return LinearClassification {
            weight: w,
            bias: b,
            init_loss: F::ZERO,
            final_loss: F::ZERO,
            init_acc: F::ZERO,
            final_acc: F::ZERO,
        };
    }
    let mean_scale = F::ONE / total_weight;

    let mut init_loss = F::ZERO;
    let mut final_loss = F::ZERO;
    let mut init_acc = F::ZERO;
    let mut final_acc = F::ZERO;

    for iter in 0..iters {
        let mut weight_grad = C::default();
        let mut bias_grad = F::ZERO;
        let mut total_loss = F::ZERO;
        let mut acc = F::ZERO;
        for (i, &c) in coords.iter().enumerate() {
            let target = targets[i];
            let weight = weights[i] * mean_scale;
            if weight == F::ZERO {
                continue;
            }
            let pred = w.dot(c) + b;
            let (loss, loss_grad) = loss_fn.loss_and_grad(pred, target);
            if (pred > F::ZERO) == target {
                acc += weight;
            }
            weight_grad = weight_grad + c.scale(loss_grad * weight);
            bias_grad += loss_grad * weight;
            total_loss += loss * weight;
        }

        if iter == 0 {
            init_loss = total_loss;
            init_acc = acc;
        } else if iter == iters - 1 {
            final_loss = total_loss;
            final_acc = acc;
        }

        let (new_w, new_b) = opt.step(weight_grad, bias_grad);
        w = new_w;
        b = new_b;
    }

    LinearClassification {
        weight: w,
        bias: b,
        init_loss,
        final_loss,
        init_acc,
        final_acc,
    }
}
