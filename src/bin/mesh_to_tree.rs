//! Learn a bounded solid tree from an STL mesh.
//!
//! Greedy construction over icosphere axes, then TAO refinement with active
//! resampling near the decision boundary and around misclassified points.
//!
//! Usage: `mesh_to_tree [flags] <input.stl> <output.bin>`

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
use shapetree::geom::Solid;
use shapetree::io::{save, write_bounded_solid_tree};
use shapetree::loss::{EntropySplitLoss, EqualityLoss};
use shapetree::mesh::{read_stl, MeshSolid};
use shapetree::refine::Tao;
use shapetree::sample::{
    padded_bounds, sample_decision_boundary_mesh, sample_near_misclassified,
    solid_dataset_in_bounds,
};
use shapetree::tree::BoundedSolidTree;
use shapetree::{Coord, ForkQueue};

#[derive(Parser, Debug)]
#[command(name = "mesh_to_tree")]
#[command(about = "Learn a bounded solid tree from an STL mesh")]
struct Args {
    /// Input mesh (binary STL)
    input: PathBuf,

    /// Output tree (binary)
    output: PathBuf,

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

    /// Maximum iterations of TAO
    #[arg(long = "tao-iters", default_value_t = 10)]
    tao_iters: usize,

    /// Maximum tree depth
    #[arg(long, default_value_t = 6)]
    depth: usize,

    /// Number of points to sample for the dataset
    #[arg(long = "dataset-size", default_value_t = 1_000_000)]
    dataset_size: usize,

    /// Number of points to sample for TAO
    #[arg(long = "tao-dataset-size", default_value_t = 1_000_000)]
    tao_dataset_size: usize,

    /// Number of points to sample per active learning step
    #[arg(long = "active-points", default_value_t = 50_000)]
    active_points: usize,

    /// Grid size for the active learning mesh
    #[arg(long = "active-grid-size", default_value_t = 64)]
    active_grid_size: usize,

    /// Noise scale for active learning, as a fraction of the diagonal
    #[arg(long = "active-epsilon", default_value_t = 0.01)]
    active_epsilon: f64,

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

    info!("creating mesh dataset");
    let mesh = {
        let file = File::open(&args.input).with_context(|| format!("open {:?}", args.input))?;
        read_stl(&mut BufReader::new(file)).context("read input STL")?
    };
    let (mesh_min, mesh_max) = (mesh.min(), mesh.max());
    let solid = MeshSolid::new(&mesh);
    let (sample_min, sample_max) = padded_bounds(&solid);
    let mut rng = Xoshiro256PlusPlus::from_entropy();
    let pool = ForkQueue::new(0);

    let dataset = |rng: &mut Xoshiro256PlusPlus, n: usize| {
        solid_dataset_in_bounds(&solid, sample_min, sample_max, n, &pool, rng)
    };

    info!("building initial tree");
    let axes = ConstantAxisSchedule::icosphere(args.axis_resolution);
    let (coords, labels) = dataset(&mut rng, args.dataset_size);
    let tree = greedy_tree(
        axes.axes(),
        &coords,
        &labels,
        &EntropySplitLoss::default(),
        0,
        args.depth,
    );
    let mut tree = Arc::new(tree);

    info!("sampling TAO dataset");
    let (mut coords, mut labels) = dataset(&mut rng, args.tao_dataset_size);
    let (test_coords, test_labels) = dataset(&mut rng, args.tao_dataset_size);

    info!("refining tree with TAO");
    let tao = Tao {
        loss: EqualityLoss,
        lr: args.lr,
        weight_decay: args.weight_decay,
        momentum: args.momentum,
        iters: args.iters,
        concurrency: 0,
        verbose: args.verbose,
    };
    let mut test_loss =
        shapetree::loss::total_loss(&tree, &EqualityLoss, &test_coords, &test_labels);
    for i in 0..args.tao_iters {
        if args.active_points > 0 {
            info!(count = args.active_points, "sampling active learning points");
            let bounded = BoundedSolidTree {
                min: sample_min,
                max: sample_max,
                tree: tree.clone(),
            };
            let mut active = sample_decision_boundary_mesh(
                &bounded,
                args.active_points / 2,
                args.active_grid_size,
                &mut rng,
            );
            let epsilon = sample_min.dist(sample_max) * args.active_epsilon;
            active.extend(sample_near_misclassified(
                &bounded,
                &coords,
                &labels,
                args.active_points / 2,
                epsilon,
                &mut rng,
            ));

            let mut num_correct = 0usize;
            for point in &active {
                let label = solid.contains(*point);
                if *tree.predict(*point) == label {
                    num_correct += 1;
                }
                coords.push(*point);
                labels.push(label);
            }
            info!(
                accuracy = num_correct as f64 / active.len().max(1) as f64,
                "active accuracy"
            );
        }

        let result = tao.optimize(&tree, &coords, &labels);
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
            shapetree::loss::total_loss(&result.tree, &EqualityLoss, &test_coords, &test_labels);
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
    tree = tree.simplify(&mut coords, &mut labels, &EqualityLoss);
    info!(from = old_count, to = tree.num_leaves(), "simplified");

    info!("writing output");
    let bounded = BoundedSolidTree {
        min: mesh_min,
        max: mesh_max,
        tree,
    };
    save(&args.output, &bounded, |w, t| {
        write_bounded_solid_tree(w, t)
    })
    .context("write output tree")?;
    Ok(())
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
