//! Learn a bounded solid tree with the adaptive builder.
//!
//! Instead of one huge up-front dataset, each tree cell resamples itself via
//! hit-and-run when it runs low on points, and the split search mutates the
//! best axis over several stages.
//!
//! Usage: `mesh_to_tree_v2 [flags] <input.stl> <output.bin>`

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::info;

use shapetree::build::{adaptive_greedy_tree, ConstantAxisSchedule, MutationAxisSchedule};
use shapetree::geom::{Polytope, Solid};
use shapetree::io::{save, write_bounded_solid_tree};
use shapetree::loss::EntropySplitLoss;
use shapetree::mesh::{read_stl, MeshSolid};
use shapetree::sample::{solid_dataset, HitAndRunSampler};
use shapetree::tree::BoundedSolidTree;
use shapetree::ForkQueue;

#[derive(Parser, Debug)]
#[command(name = "mesh_to_tree_v2")]
#[command(about = "Learn a bounded solid tree with adaptive resampling")]
struct Args {
    /// Input mesh (binary STL)
    input: PathBuf,

    /// Output tree (binary)
    output: PathBuf,

    /// Maximum tree depth
    #[arg(long, default_value_t = 20)]
    depth: usize,

    /// Minimum samples per leaf when splitting
    #[arg(long = "min-leaf-size", default_value_t = 5)]
    min_leaf_size: usize,

    /// Number of points to sample for the initial dataset
    #[arg(long = "init-dataset-size", default_value_t = 50_000)]
    init_dataset_size: usize,

    /// Minimum dataset size at every cell
    #[arg(long = "min-dataset-size", default_value_t = 1000)]
    min_dataset_size: usize,

    /// Icosphere subdivisions when creating split axes
    #[arg(long = "axis-resolution", default_value_t = 2)]
    axis_resolution: usize,

    /// Number of mutation directions per stage
    #[arg(long = "mutation-count", default_value_t = 30)]
    mutation_count: usize,

    /// Scale of mutations, one stage per value
    #[arg(long = "mutation-stddev", value_delimiter = ',', default_values_t = [0.025, 0.01])]
    mutation_stddev: Vec<f64>,

    /// Monte Carlo steps per hit-and-run sample
    #[arg(long = "hit-and-run-iterations", default_value_t = 20)]
    hit_and_run_iterations: usize,

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
    let solid = MeshSolid::new(&mesh);
    let mut rng = Xoshiro256PlusPlus::from_entropy();
    let pool = ForkQueue::new(0);
    let (coords, labels) = solid_dataset(&solid, args.init_dataset_size, &pool, &mut rng);

    info!("building tree");
    let schedule = MutationAxisSchedule {
        initial: ConstantAxisSchedule::icosphere(args.axis_resolution)
            .axes()
            .to_vec(),
        counts: vec![args.mutation_count; args.mutation_stddev.len()],
        stddevs: args.mutation_stddev.clone(),
    };
    let loss = EntropySplitLoss {
        min_count: args.min_leaf_size,
    };
    let sampler = HitAndRunSampler::new(args.hit_and_run_iterations);
    let oracle = |p| solid.contains(p);
    let tree = adaptive_greedy_tree(
        &schedule,
        Polytope::cube(solid.min(), solid.max()),
        coords,
        labels,
        &oracle,
        &loss,
        &sampler,
        args.min_dataset_size,
        0,
        args.depth,
        &mut rng,
    );
    let tree = Arc::new(tree);

    info!("validating");
    let (val_coords, val_labels) = solid_dataset(&solid, args.init_dataset_size, &pool, &mut rng);
    let num_correct = val_coords
        .iter()
        .zip(val_labels.iter())
        .filter(|(p, l)| *tree.predict(**p) == **l)
        .count();
    info!(
        accuracy = 100.0 * num_correct as f64 / val_labels.len() as f64,
        correct = num_correct,
        total = val_labels.len(),
        "validation accuracy"
    );

    info!("writing output");
    let bounded = BoundedSolidTree {
        min: solid.min(),
        max: solid.max(),
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
