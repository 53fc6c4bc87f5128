//! Prune a solid tree to a leaf budget against mesh-labeled samples.
//!
//! Usage: `simplify_tree [flags] <input.stl> <input.bin> <output.bin>`

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::info;

use shapetree::decimate::decimate;
use shapetree::io::{load, read_bounded_solid_tree, save, write_bounded_solid_tree};
use shapetree::loss::EqualityLoss;
use shapetree::mesh::{read_stl, MeshSolid};
use shapetree::sample::solid_dataset_in_bounds;
use shapetree::ForkQueue;

#[derive(Parser, Debug)]
#[command(name = "simplify_tree")]
#[command(about = "Prune a solid tree to a leaf budget")]
struct Args {
    /// Reference mesh (binary STL)
    mesh: PathBuf,

    /// Input tree (binary)
    input: PathBuf,

    /// Output tree (binary)
    output: PathBuf,

    /// Maximum number of leaves
    #[arg(long = "max-leaves", default_value_t = 512)]
    max_leaves: usize,

    /// Number of point samples to use
    #[arg(long = "num-samples", default_value_t = 2_000_000)]
    num_samples: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    info!("loading tree");
    let mut bounded = load(&args.input, |r| read_bounded_solid_tree(r)).context("load tree")?;

    info!("loading mesh");
    let mesh = {
        let file = File::open(&args.mesh).with_context(|| format!("open {:?}", args.mesh))?;
        read_stl(&mut BufReader::new(file)).context("read input STL")?
    };
    let solid = MeshSolid::new(&mesh);

    info!("sampling points");
    let mut rng = Xoshiro256PlusPlus::from_entropy();
    let pool = ForkQueue::new(0);
    let (mut points, mut labels) = solid_dataset_in_bounds(
        &solid,
        mesh.min(),
        mesh.max(),
        args.num_samples,
        &pool,
        &mut rng,
    );

    info!(leaves = bounded.tree.num_leaves(), target = args.max_leaves, "decimating");
    bounded.tree = decimate(
        bounded.tree,
        args.max_leaves,
        &EqualityLoss,
        &mut points,
        &mut labels,
        0,
    );
    info!(leaves = bounded.tree.num_leaves(), "done");

    info!("saving tree");
    save(&args.output, &bounded, |w, t| {
        write_bounded_solid_tree(w, t)
    })
    .context("write output tree")?;
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
