//! Tree refinement: TAO and the linear classifier behind it.

mod classifier;
mod tao;

pub use classifier::{
    line_search_scale, linear_classification, ClassifierLoss, HingeLoss, LinearClassification,
    LinearOptimizer, SgdOptimizer,
};
pub use tao::{AdaptiveTao, Tao, TaoResult};
