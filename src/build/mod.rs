//! Tree builders: greedy search and the adaptive, resampling variant.

mod adaptive;
mod axes;
mod greedy;

pub(crate) use adaptive::adaptive_resample;

pub use adaptive::{adaptive_greedy_tree, DEFAULT_ADAPTIVE_SAMPLE_ITERS};
pub use axes::{spawn_rngs, AxisSchedule, ConstantAxisSchedule, MutationAxisSchedule};
pub use greedy::greedy_tree;
