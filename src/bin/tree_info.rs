//! Print basic information about a stored solid tree.
//!
//! Usage: `tree_info <input.bin>`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use shapetree::io::{load, read_bounded_solid_tree};

#[derive(Parser, Debug)]
#[command(name = "tree_info")]
#[command(about = "Print information about a stored solid tree")]
struct Args {
    /// Input tree (binary)
    input: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let tree = load(&args.input, |r| read_bounded_solid_tree(r)).context("load tree")?;
    println!("Number of leaves: {}", tree.tree.num_leaves());
    Ok(())
}
