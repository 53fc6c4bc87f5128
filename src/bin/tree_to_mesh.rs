//! Mesh a solid tree's surface and write it as STL.
//!
//! Usage: `tree_to_mesh [flags] <input.bin> <output.stl>`

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use shapetree::collide::TreeSolid;
use shapetree::io::{load, read_bounded_solid_tree};
use shapetree::mesh::{grid_mesh, write_stl};

#[derive(Parser, Debug)]
#[command(name = "tree_to_mesh")]
#[command(about = "Mesh a solid tree's surface as STL")]
struct Args {
    /// Input tree (binary)
    input: PathBuf,

    /// Output mesh (binary STL)
    output: PathBuf,

    /// Meshing grid size
    #[arg(long = "grid-size", default_value_t = 64)]
    grid_size: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    info!("loading tree");
    let bounded = load(&args.input, |r| read_bounded_solid_tree(r)).context("load tree")?;

    info!("creating mesh");
    let solid = TreeSolid::new(bounded);
    let mesh = grid_mesh(&solid, args.grid_size);
    info!(triangles = mesh.len(), "meshed");

    let file = File::create(&args.output).with_context(|| format!("create {:?}", args.output))?;
    write_stl(&mut BufWriter::new(file), &mesh).context("write STL")?;
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
