//! Fit a normal-map ensemble to a solid tree's decision boundary.
//!
//! Points are sampled on the boundary by ray casting, jittered slightly, and
//! labeled with the normal of the nearest mesh surface. Each tree in the
//! ensemble fits the residual left by its predecessors (greedy variance
//! splits, then TAO with squared error), and the stream of trees is written
//! back to back.
//!
//! Usage: `mesh_to_normal_map [flags] <tree.bin> <mesh.stl> <output.bin>`

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::info;

use shapetree::build::{greedy_tree, ConstantAxisSchedule};
use shapetree::io::{load, read_bounded_solid_tree, save_multiple, write_coord_tree};
use shapetree::loss::{total_loss, SquaredErrorLoss, VarianceSplitLoss};
use shapetree::mesh::{read_stl, MeshCollider};
use shapetree::refine::Tao;
use shapetree::sample::sample_decision_boundary_cast;
use shapetree::tree::CoordTree;
use shapetree::{Coord, Vec3};

#[derive(Parser, Debug)]
#[command(name = "mesh_to_normal_map")]
#[command(about = "Fit a normal-map tree ensemble near a solid tree's surface")]
struct Args {
    /// Input solid tree (binary)
    tree: PathBuf,

    /// Input mesh (binary STL)
    mesh: PathBuf,

    /// Output normal-map tree stream (binary)
    output: PathBuf,

    /// Dataset size for the surface
    #[arg(long = "dataset-size", default_value_t = 1_000_000)]
    dataset_size: usize,

    /// Noise to add to input points, as a fraction of the diagonal
    #[arg(long = "dataset-epsilon", default_value_t = 1e-4)]
    dataset_epsilon: f64,

    /// Number of trees in the ensemble
    #[arg(long = "num-trees", default_value_t = 3)]
    num_trees: usize,

    /// Maximum tree depth
    #[arg(long = "max-depth", default_value_t = 8)]
    depth: usize,

    /// Maximum number of TAO iterations
    #[arg(long = "tao-iters", default_value_t = 5)]
    tao_iters: usize,

    /// Learning rate for SVM training
    #[arg(long, default_value_t = 0.1)]
    lr: f64,

    /// Weight decay for SVM training
    #[arg(long = "weight-decay", default_value_t = 1e-4)]
    weight_decay: f64,

    /// Nesterov momentum for SVM training
    #[arg(long, default_value_t = 0.9)]
    momentum: f64,

    /// Iterations for SVM training
    #[arg(long, default_value_t = 1000)]
    iters: usize,

    /// Minimum samples per leaf for greedy trees
    #[arg(long = "min-leaf-size", default_value_t = 5)]
    min_leaf_size: usize,

    /// Icosphere subdivisions when creating split axes
    #[arg(long = "axis-resolution", default_value_t = 2)]
    axis_resolution: usize,

    /// Print extra optimization information
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("loading tree");
    let solid_tree = load(&args.tree, |r| read_bounded_solid_tree(r)).context("load solid tree")?;

    info!("loading mesh");
    let mut mesh = {
        let file = File::open(&args.mesh).with_context(|| format!("open {:?}", args.mesh))?;
        read_stl(&mut BufReader::new(file)).context("read input STL")?
    };
    let removed = mesh.remove_degenerate();
    if removed > 0 {
        info!(removed, "removed invalid triangles");
    }
    let mesh_field = MeshCollider::new(&mesh);

    info!("sampling dataset");
    let mut rng = Xoshiro256PlusPlus::from_entropy();
    let mesh_scale = mesh_field.min().dist(mesh_field.max());
    let noise_scale = mesh_scale * args.dataset_epsilon;
    let mut sample_dataset = |rng: &mut Xoshiro256PlusPlus| {
        let mut inputs = sample_decision_boundary_cast(&solid_tree, args.dataset_size, 0, rng);
        let targets: Vec<Vec3<f64>> = inputs
            .iter_mut()
            .map(|p| {
                *p = *p + Vec3::random_gaussian(rng).scale(noise_scale);
                mesh_field.nearest_normal(*p)
            })
            .collect();
        (inputs, targets)
    };
    let (inputs, mut targets) = sample_dataset(&mut rng);
    let (test_inputs, mut test_targets) = sample_dataset(&mut rng);

    let mut trees: Vec<CoordTree> = Vec::with_capacity(args.num_trees);
    for i in 0..args.num_trees {
        info!(tree = i + 1, total = args.num_trees, "creating tree");
        let tree = build_tree(&args, &inputs, &targets, &test_inputs, &test_targets);

        let subtract_residual =
            |tree: &CoordTree, inputs: &[Vec3<f64>], targets: &mut [Vec3<f64>]| {
                for (x, target) in inputs.iter().zip(targets.iter_mut()) {
                    *target = *target - *tree.predict(*x);
                }
            };
        subtract_residual(&tree, &inputs, &mut targets);
        subtract_residual(&tree, &test_inputs, &mut test_targets);
        trees.push(tree);
    }

    info!("writing output");
    save_multiple(&args.output, &trees, |w, t| write_coord_tree(w, t))
        .context("write normal map")?;
    Ok(())
}

fn build_tree(
    args: &Args,
    inputs: &[Vec3<f64>],
    targets: &[Vec3<f64>],
    test_inputs: &[Vec3<f64>],
    test_targets: &[Vec3<f64>],
) -> CoordTree {
    info!("building greedy tree");
    let axes = ConstantAxisSchedule::icosphere(args.axis_resolution);
    let tree = greedy_tree(
        axes.axes(),
        inputs,
        targets,
        &VarianceSplitLoss {
            min_count: args.min_leaf_size,
        },
        0,
        args.depth,
    );
    let mut tree = Arc::new(tree);

    info!("performing TAO");
    let tao = Tao {
        loss: SquaredErrorLoss,
        lr: args.lr,
        weight_decay: args.weight_decay,
        momentum: args.momentum,
        iters: args.iters,
        concurrency: 0,
        verbose: args.verbose,
    };
    let mut test_loss = total_loss(&tree, &SquaredErrorLoss, test_inputs, test_targets);
    for i in 0..args.tao_iters {
        let result = tao.optimize(&tree, inputs, targets);
        if result.new_loss >= result.old_loss {
            info!(
                iteration = i,
                loss = result.old_loss,
                test_loss,
                "no improvement; stopping"
            );
            break;
        }
        let new_test_loss =
            total_loss(&result.tree, &SquaredErrorLoss, test_inputs, test_targets);
        info!(
            iteration = i,
            old_loss = result.old_loss,
            new_loss = result.new_loss,
            old_test_loss = test_loss,
            new_test_loss,
            "TAO iteration"
        );
        test_loss = new_test_loss;
        tree = result.tree;
    }

    info!("simplifying tree");
    let old_count = tree.num_leaves();
    let mut points = inputs.to_vec();
    let mut labels = targets.to_vec();
    let tree = tree.simplify(&mut points, &mut labels, &SquaredErrorLoss);
    info!(from = old_count, to = tree.num_leaves(), "simplified");

    Arc::try_unwrap(tree).unwrap_or_else(|arc| (*arc).clone())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}
