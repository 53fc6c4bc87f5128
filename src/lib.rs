//! shapetree: compact oblique decision trees that approximate 3D shapes.
//!
//! Given a watertight mesh (or any containment oracle), this crate learns a
//! binary tree whose internal nodes are oriented half-space tests
//! (`point . axis >= threshold`) and whose leaves carry either a boolean
//! (inside/outside a solid) or a 3D vector (surface normal). The resulting
//! trees answer point queries, ray casts, and sphere queries quickly, prune
//! down to level-of-detail budgets, and serialize to a compact bit-stable
//! format.
//!
//! # Pipeline
//!
//! - [`build`]: greedy construction over candidate axes, plus the adaptive
//!   variant that resamples sparse cells through an oracle
//! - [`refine`]: Tree Alternating Optimization, which re-learns each split
//!   as a weighted linear SVM and never regresses the training loss
//! - [`decimate`]: best-replacement pruning to a leaf budget
//! - [`collide`], [`sample`]: ray/sphere queries and boundary sampling that
//!   drive active learning and rendering
//! - [`io`]: the little-endian 32-bit on-disk format
//!
//! # Example
//!
//! ```
//! use shapetree::build::greedy_tree;
//! use shapetree::geom::Vec3;
//! use shapetree::loss::EntropySplitLoss;
//!
//! let points = vec![Vec3::new(0.2, 0.0, 0.0), Vec3::new(0.8, 0.0, 0.0)];
//! let labels = vec![false, true];
//! let axes = [Vec3::x_axis(), Vec3::y_axis(), Vec3::z_axis()];
//! let tree = greedy_tree(&axes, &points, &labels, &EntropySplitLoss::default(), 0, 4);
//! assert!(*tree.predict(Vec3::new(0.9, 0.0, 0.0)));
//! ```

pub mod build;
pub mod collide;
pub mod decimate;
pub mod fork;
pub mod geom;
pub mod io;
pub mod loss;
pub mod mesh;
pub mod refine;
pub mod render;
pub mod sample;
pub mod tree;

// The types almost every consumer touches.
pub use collide::{Collider3, MapNormals, RayCollision, TreeCollider, TreeSolid};
pub use fork::ForkQueue;
pub use geom::{Coord, Polytope, Real, Solid, Vec3};
pub use loss::{
    EntropySplitLoss, EqualityLoss, SplitLoss, SquaredErrorLoss, TaoLoss, VarianceSplitLoss,
};
pub use refine::{Tao, TaoResult};
pub use tree::{BoundedSolidTree, BoundedTree, CoordTree, SolidTree, Tree};
