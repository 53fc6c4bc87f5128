//! Measure the size/quality trade-off of a normal-map ensemble.
//!
//! For every prefix of the ensemble, prints the cumulative serialized size,
//! the mean squared error of the summed prediction against the mesh normal,
//! and the mean cosine similarity.
//!
//! Usage: `normal_map_tradeoff [flags] <tree.bin> <mesh.stl> <map.bin>`

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::info;

use shapetree::io::{
    load, load_multiple, read_bounded_solid_tree, read_coord_tree, write_coord_tree,
};
use shapetree::mesh::{read_stl, MeshCollider};
use shapetree::sample::sample_decision_boundary_cast;
use shapetree::{Coord, Vec3};

#[derive(Parser, Debug)]
#[command(name = "normal_map_tradeoff")]
#[command(about = "Print size/MSE/cosine curves for a normal-map ensemble")]
struct Args {
    /// Input solid tree (binary)
    tree: PathBuf,

    /// Input mesh (binary STL)
    mesh: PathBuf,

    /// Normal-map tree stream (binary)
    normals: PathBuf,

    /// Dataset size for the surface
    #[arg(long = "dataset-size", default_value_t = 1_000_000)]
    dataset_size: usize,

    /// Noise to add to input points, as a fraction of the diagonal
    #[arg(long = "dataset-epsilon", default_value_t = 1e-4)]
    dataset_epsilon: f64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

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

    info!("loading normal map");
    let trees = load_multiple(&args.normals, |r| read_coord_tree(r)).context("load normal map")?;
    anyhow::ensure!(!trees.is_empty(), "normal map stream is empty");

    info!("sampling dataset");
    let mut rng = Xoshiro256PlusPlus::from_entropy();
    let mesh_scale = mesh_field.min().dist(mesh_field.max());
    let noise_scale = mesh_scale * args.dataset_epsilon;
    let mut inputs = sample_decision_boundary_cast(&solid_tree, args.dataset_size, 0, &mut rng);
    let targets: Vec<Vec3<f64>> = inputs
        .iter_mut()
        .map(|p| {
            *p = *p + Vec3::random_gaussian(&mut rng).scale(noise_scale);
            mesh_field.nearest_normal(*p)
        })
        .collect();

    info!("evaluating trees");
    let mut predictions = vec![Vec3::<f64>::zero(); targets.len()];
    let mut sizes = Vec::with_capacity(trees.len());
    let mut mses = Vec::with_capacity(trees.len());
    let mut dots = Vec::with_capacity(trees.len());
    for (i, tree) in trees.iter().enumerate() {
        let mut mse = 0.0;
        let mut dot = 0.0;
        for (x, (pred, target)) in inputs
            .iter()
            .zip(predictions.iter_mut().zip(targets.iter()))
        {
            *pred = *pred + *tree.predict(*x);
            mse += (*target - *pred).norm_squared();
            let norm = pred.norm();
            if norm != 0.0 {
                dot += target.dot(pred.scale(1.0 / norm));
            }
        }

        let mut encoded = Vec::new();
        write_coord_tree(&mut encoded, tree).context("measure tree size")?;
        let mut size = encoded.len();
        if i > 0 {
            size += sizes[i - 1];
        }
        sizes.push(size);
        mses.push(mse / inputs.len() as f64);
        dots.push(dot / inputs.len() as f64);
    }

    println!("Sizes: {}", serde_json::to_string(&sizes)?);
    println!("MSE: {}", serde_json::to_string(&mses)?);
    println!("Dot: {}", serde_json::to_string(&dots)?);
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
