//! Produce a directory of normalized LOD trees plus metadata for a viewer.
//!
//! The model and its normal map are rescaled so the shape is centered at the
//! origin with extent 2, then decimated into a ladder of leaf budgets. A
//! `metadata.json` index records every file with its leaf count and size.
//!
//! Usage: `prepare_for_web --mesh <in.stl> --model <tree.bin> --normals <map.bin> --output <dir>`

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;
use tracing::info;

use shapetree::decimate::decimate;
use shapetree::io::{
    load, read_bounded_solid_tree, read_coord_tree, save, write_bounded_solid_tree,
    write_coord_tree,
};
use shapetree::loss::EqualityLoss;
use shapetree::mesh::{read_stl, MeshSolid};
use shapetree::sample::solid_dataset_in_bounds;
use shapetree::tree::{BoundedSolidTree, CoordTree};
use shapetree::{Coord, ForkQueue};

const LOD_LADDER: [usize; 3] = [1024, 512, 256];

#[derive(Parser, Debug)]
#[command(name = "prepare_for_web")]
#[command(about = "Write normalized LODs and metadata for web viewing")]
struct Args {
    /// Path to the input mesh
    #[arg(long)]
    mesh: PathBuf,

    /// Path to the input model
    #[arg(long)]
    model: PathBuf,

    /// Path to the normal map
    #[arg(long)]
    normals: PathBuf,

    /// Path to the output directory
    #[arg(long)]
    output: PathBuf,

    /// Number of samples for simplification
    #[arg(long = "num-samples", default_value_t = 2_000_000)]
    num_samples: usize,
}

#[derive(Serialize)]
struct Metadata {
    normals: TreeInfo,
    lods: Vec<TreeInfo>,
}

#[derive(Serialize)]
struct TreeInfo {
    num_leaves: usize,
    filename: String,
    file_size: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    info!("loading input tree");
    let mut model = load(&args.model, |r| read_bounded_solid_tree(r)).context("load model")?;

    info!("loading normal map");
    let normals = load(&args.normals, |r| read_coord_tree(r)).context("load normal map")?;

    info!("loading mesh");
    let mesh = {
        let file = File::open(&args.mesh).with_context(|| format!("open {:?}", args.mesh))?;
        read_stl(&mut BufReader::new(file)).context("read input STL")?
    };
    let solid = MeshSolid::new(&mesh);

    info!("sampling points");
    let mut rng = Xoshiro256PlusPlus::from_entropy();
    let pool = ForkQueue::new(0);
    let (mut points, mut values) = solid_dataset_in_bounds(
        &solid,
        model.min,
        model.max,
        args.num_samples,
        &pool,
        &mut rng,
    );

    info!("writing outputs");
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("create {:?}", args.output))?;

    // Normalize: center at the origin, max extent 2.
    let offset = -model.max.mid(model.min);
    let scale = 2.0 / (model.max - model.min).abs().max_coord();
    let normals = normals.translate(offset).scale(scale);

    let normals_info = write_normals(&args.output.join("normals.bin"), &normals)?;
    let mut lods = vec![write_tree(
        &args.output.join("full.bin"),
        &model.translate(offset).scale(scale),
    )?];

    info!("writing LODs");
    for lod in LOD_LADDER {
        if model.tree.num_leaves() <= lod {
            continue;
        }
        info!(lod, "working on LOD");
        model.tree = decimate(
            model.tree,
            lod,
            &EqualityLoss,
            &mut points,
            &mut values,
            0,
        );
        let filename = format!("lod_{}.bin", model.tree.num_leaves());
        lods.push(write_tree(
            &args.output.join(filename),
            &model.translate(offset).scale(scale),
        )?);
    }

    info!("saving metadata");
    let metadata = Metadata {
        normals: normals_info,
        lods,
    };
    let file = File::create(args.output.join("metadata.json")).context("create metadata.json")?;
    serde_json::to_writer(file, &metadata).context("write metadata.json")?;
    Ok(())
}

fn write_tree(path: &Path, tree: &BoundedSolidTree) -> Result<TreeInfo> {
    save(path, tree, |w, t| write_bounded_solid_tree(w, t))
        .with_context(|| format!("write {:?}", path))?;
    file_info(path, tree.tree.num_leaves())
}

fn write_normals(path: &Path, tree: &CoordTree) -> Result<TreeInfo> {
    save(path, tree, |w, t| write_coord_tree(w, t))
        .with_context(|| format!("write {:?}", path))?;
    file_info(path, tree.num_leaves())
}

fn file_info(path: &Path, num_leaves: usize) -> Result<TreeInfo> {
    let meta = std::fs::metadata(path).with_context(|| format!("stat {:?}", path))?;
    Ok(TreeInfo {
        num_leaves,
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_size: meta.len(),
    })
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
