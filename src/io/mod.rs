//! Bit-stable binary serialization of trees.
//!
//! Everything is little-endian 32-bit floats. A bounded tree starts with six
//! bounds floats (min then max); a tree is written pre-order, each branch as
//! axis (3 floats) + threshold (1 float) followed by its children. A zero
//! axis tags a leaf, so the writer refuses zero branch axes, and the leaf
//! payload follows the tag: one float for booleans (0 or 1), three for
//! vectors. Streams are plain concatenations; the reader stops at a clean
//! EOF between trees.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::geom::Vec3;
use crate::tree::{BoundedSolidTree, CoordTree, SolidTree, Tree};

/// Errors from tree serialization.
#[derive(Debug, thiserror::Error)]
pub enum TreeIoError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// A branch axis on disk was not a finite vector.
    #[error("{context}: malformed axis in tree data")]
    MalformedAxis { context: &'static str },
}

impl TreeIoError {
    fn wrap(context: &'static str) -> impl FnOnce(io::Error) -> TreeIoError {
        move |source| TreeIoError::Io { context, source }
    }
}

#[inline]
fn write_f32<W: Write>(w: &mut W, x: f32) -> io::Result<()> {
    w.write_all(&x.to_le_bytes())
}

#[inline]
fn read_f32<R: Read>(r: &mut R) -> io::Result<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn write_vec3<W: Write>(w: &mut W, v: Vec3<f64>) -> io::Result<()> {
    write_f32(w, v.x as f32)?;
    write_f32(w, v.y as f32)?;
    write_f32(w, v.z as f32)
}

fn read_vec3<R: Read>(r: &mut R) -> io::Result<Vec3<f64>> {
    let x = read_f32(r)?;
    let y = read_f32(r)?;
    let z = read_f32(r)?;
    Ok(Vec3::new(x as f64, y as f64, z as f64))
}

// =============================================================================
// Generic pre-order tree codec
// =============================================================================

fn write_tree_with<W: Write, T>(
    w: &mut W,
    tree: &Tree<f64, Vec3<f64>, T>,
    leaf: &impl Fn(&mut W, &T) -> io::Result<()>,
) -> io::Result<()> {
    match tree {
        Tree::Leaf(value) => {
            write_vec3(w, Vec3::zero())?;
            leaf(w, value)
        }
        Tree::Branch {
            axis,
            threshold,
            less_than,
            greater_equal,
        } => {
            let encoded =
                Vec3::new(axis.x as f32 as f64, axis.y as f32 as f64, axis.z as f32 as f64);
            if encoded == Vec3::zero() {
                panic!("cannot encode zero axis for branch");
            }
            write_vec3(w, *axis)?;
            write_f32(w, *threshold as f32)?;
            write_tree_with(w, less_than, leaf)?;
            write_tree_with(w, greater_equal, leaf)
        }
    }
}

fn read_tree_with<R: Read, T>(
    r: &mut R,
    context: &'static str,
    leaf: &impl Fn(&mut R) -> io::Result<T>,
) -> Result<Tree<f64, Vec3<f64>, T>, TreeIoError> {
    let axis = read_vec3(r).map_err(TreeIoError::wrap(context))?;
    if axis == Vec3::zero() {
        let value = leaf(r).map_err(TreeIoError::wrap(context))?;
        return Ok(Tree::Leaf(value));
    }
    if !axis.is_finite() {
        return Err(TreeIoError::MalformedAxis { context });
    }
    let threshold = read_f32(r).map_err(TreeIoError::wrap(context))? as f64;
    let less_than = read_tree_with(r, context, leaf)?;
    let greater_equal = read_tree_with(r, context, leaf)?;
    Ok(Tree::Branch {
        axis,
        threshold,
        less_than: Arc::new(less_than),
        greater_equal: Arc::new(greater_equal),
    })
}

fn write_bool_leaf<W: Write>(w: &mut W, value: &bool) -> io::Result<()> {
    write_f32(w, if *value { 1.0 } else { 0.0 })
}

fn read_bool_leaf<R: Read>(r: &mut R) -> io::Result<bool> {
    Ok(read_f32(r)? != 0.0)
}

// =============================================================================
// Public entry points
// =============================================================================

/// Serialize a boolean tree.
pub fn write_solid_tree<W: Write>(w: &mut W, tree: &SolidTree) -> Result<(), TreeIoError> {
    write_tree_with(w, tree, &write_bool_leaf).map_err(TreeIoError::wrap("write solid tree"))
}

/// Read the output of [`write_solid_tree`].
pub fn read_solid_tree<R: Read>(r: &mut R) -> Result<SolidTree, TreeIoError> {
    read_tree_with(r, "read solid tree", &read_bool_leaf)
}

/// Serialize a bounded boolean tree: six bounds floats, then the tree.
pub fn write_bounded_solid_tree<W: Write>(
    w: &mut W,
    tree: &BoundedSolidTree,
) -> Result<(), TreeIoError> {
    let wrap = TreeIoError::wrap("write bounded solid tree");
    write_vec3(w, tree.min)
        .and_then(|()| write_vec3(w, tree.max))
        .and_then(|()| write_tree_with(w, &tree.tree, &write_bool_leaf))
        .map_err(wrap)
}

/// Read the output of [`write_bounded_solid_tree`].
pub fn read_bounded_solid_tree<R: Read>(r: &mut R) -> Result<BoundedSolidTree, TreeIoError> {
    let context = "read bounded solid tree";
    let min = read_vec3(r).map_err(TreeIoError::wrap(context))?;
    let max = read_vec3(r).map_err(TreeIoError::wrap(context))?;
    let tree = read_tree_with(r, context, &read_bool_leaf)?;
    Ok(BoundedSolidTree {
        min,
        max,
        tree: Arc::new(tree),
    })
}

/// Serialize a vector-valued tree (leaves are three floats).
pub fn write_coord_tree<W: Write>(w: &mut W, tree: &CoordTree) -> Result<(), TreeIoError> {
    write_tree_with(w, tree, &|w, value: &Vec3<f64>| write_vec3(w, *value))
        .map_err(TreeIoError::wrap("write coord tree"))
}

/// Read the output of [`write_coord_tree`].
pub fn read_coord_tree<R: Read>(r: &mut R) -> Result<CoordTree, TreeIoError> {
    read_tree_with(r, "read coord tree", &|r: &mut R| read_vec3(r))
}

/// Read concatenated records until a clean EOF between records.
pub fn read_multiple<R: BufRead, T>(
    r: &mut R,
    f: impl Fn(&mut R) -> Result<T, TreeIoError>,
) -> Result<Vec<T>, TreeIoError> {
    let mut out = Vec::new();
    loop {
        let at_eof = r
            .fill_buf()
            .map_err(TreeIoError::wrap("read stream"))?
            .is_empty();
        if at_eof {
            return Ok(out);
        }
        out.push(f(r)?);
    }
}

/// Write a value to a file through a buffered writer.
pub fn save<P: AsRef<Path>, T>(
    path: P,
    value: &T,
    f: impl Fn(&mut BufWriter<File>, &T) -> Result<(), TreeIoError>,
) -> Result<(), TreeIoError> {
    let file = File::create(path).map_err(TreeIoError::wrap("create output file"))?;
    let mut writer = BufWriter::new(file);
    f(&mut writer, value)?;
    writer
        .into_inner()
        .map_err(|e| TreeIoError::Io {
            context: "flush output file",
            source: e.into_error(),
        })
        .map(|_| ())
}

/// Write a sequence of values back-to-back into one file.
pub fn save_multiple<P: AsRef<Path>, T>(
    path: P,
    values: &[T],
    f: impl Fn(&mut BufWriter<File>, &T) -> Result<(), TreeIoError>,
) -> Result<(), TreeIoError> {
    let file = File::create(path).map_err(TreeIoError::wrap("create output file"))?;
    let mut writer = BufWriter::new(file);
    for value in values {
        f(&mut writer, value)?;
    }
    writer
        .into_inner()
        .map_err(|e| TreeIoError::Io {
            context: "flush output file",
            source: e.into_error(),
        })
        .map(|_| ())
}

/// Read one value from a file through a buffered reader.
pub fn load<P: AsRef<Path>, T>(
    path: P,
    f: impl Fn(&mut BufReader<File>) -> Result<T, TreeIoError>,
) -> Result<T, TreeIoError> {
    let file = File::open(path).map_err(TreeIoError::wrap("open input file"))?;
    f(&mut BufReader::new(file))
}

/// Read concatenated values from a file until EOF.
pub fn load_multiple<P: AsRef<Path>, T>(
    path: P,
    f: impl Fn(&mut BufReader<File>) -> Result<T, TreeIoError>,
) -> Result<Vec<T>, TreeIoError> {
    let file = File::open(path).map_err(TreeIoError::wrap("open input file"))?;
    read_multiple(&mut BufReader::new(file), f)
}
