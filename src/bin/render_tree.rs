//! Render a solid tree to a PNG grid or rotating GIF.
//!
//! Usage: `render_tree [flags] <input.bin> <output.png|output.gif>`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::info;

use shapetree::collide::{Collider3, MapNormals, TreeCollider};
use shapetree::io::{load, load_multiple, read_bounded_solid_tree, read_coord_tree};
use shapetree::render::{render_random_grid, save_png, save_rotating_gif};

#[derive(Parser, Debug)]
#[command(name = "render_tree")]
#[command(about = "Render a solid tree to PNG or rotating GIF")]
struct Args {
    /// Input tree (binary)
    input: PathBuf,

    /// Output image (.png for a grid, .gif for a rotation)
    output: PathBuf,

    /// Rows and columns of the PNG grid
    #[arg(long = "grid-size", default_value_t = 3)]
    grid_size: usize,

    /// Size of each rendered image
    #[arg(long = "image-size", default_value_t = 300)]
    image_size: usize,

    /// FPS for GIF outputs
    #[arg(long, default_value_t = 10.0)]
    fps: f64,

    /// Total number of frames for GIF outputs
    #[arg(long, default_value_t = 20)]
    frames: usize,

    /// Optional normal-map tree stream
    #[arg(long = "normal-map")]
    normal_map: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    info!("loading tree");
    let bounded = load(&args.input, |r| read_bounded_solid_tree(r)).context("load tree")?;

    info!("creating renderable object");
    let collider = TreeCollider::new(bounded);
    let collider: Box<dyn Collider3> = match &args.normal_map {
        Some(path) => {
            info!("loading normal map");
            let trees = load_multiple(path, |r| read_coord_tree(r)).context("load normal map")?;
            anyhow::ensure!(!trees.is_empty(), "normal map stream is empty");
            Box::new(MapNormals::new(
                collider,
                trees.into_iter().map(Arc::new).collect(),
            ))
        }
        None => Box::new(collider),
    };

    info!("rendering");
    let is_gif = args
        .output
        .extension()
        .map(|e| e.eq_ignore_ascii_case("gif"))
        .unwrap_or(false);
    if is_gif {
        save_rotating_gif(
            &args.output,
            collider.as_ref(),
            args.image_size,
            args.frames,
            args.fps,
        )
        .context("write GIF")?;
    } else {
        let mut rng = Xoshiro256PlusPlus::from_entropy();
        let img = render_random_grid(
            collider.as_ref(),
            args.grid_size,
            args.image_size,
            &mut rng,
        );
        save_png(&args.output, &img).context("write PNG")?;
    }
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
