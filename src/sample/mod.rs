//! Samplers: hit-and-run over polytopes, labeled box datasets, and
//! decision-boundary sampling.

mod boundary;
mod dataset;
mod hit_and_run;

pub use boundary::{
    sample_branch_changes, sample_decision_boundary_cast, sample_decision_boundary_mesh,
    sample_near_misclassified,
};
pub use dataset::{padded_bounds, solid_dataset, solid_dataset_in_bounds};
pub use hit_and_run::{HitAndRunSampler, DEFAULT_HIT_AND_RUN_EPSILON};
