//! Grid meshing of a containment oracle.
//!
//! The padded bounding box is sampled on an `n^3` lattice; every cell is
//! decomposed into six tetrahedra (the Freudenthal split, which is
//! face-consistent between neighboring cells) and each tetrahedron emits
//! triangles where membership flips across its edges. Edge crossings are
//! refined by bisection against the oracle, so the surface tracks the solid
//! much more closely than the lattice spacing.

use rayon::prelude::*;

use crate::geom::{Coord, Solid, Vec3};

use super::{Mesh, Triangle};

const BISECTION_ITERS: usize = 8;

/// Mesh the surface of `solid` on a grid with `grid_size` cells per axis.
pub fn grid_mesh<S: Solid>(solid: &S, grid_size: usize) -> Mesh {
    assert!(grid_size >= 2, "grid size must be at least 2");

    // Pad by one cell so geometry touching the bounds still closes.
    let size = solid.max() - solid.min();
    let cell = size.scale(1.0 / grid_size as f64);
    let min = solid.min() - cell;
    let cells = grid_size + 2;
    let verts = cells + 1;

    let lattice_point = |x: usize, y: usize, z: usize| -> Vec3<f64> {
        min + Vec3::new(
            cell.x * x as f64,
            cell.y * y as f64,
            cell.z * z as f64,
        )
    };

    // Membership at every lattice vertex, sliced by z for parallel labeling.
    let occupancy: Vec<Vec<bool>> = (0..verts)
        .into_par_iter()
        .map(|z| {
            let mut slice = Vec::with_capacity(verts * verts);
            for y in 0..verts {
                for x in 0..verts {
                    slice.push(solid.contains(lattice_point(x, y, z)));
                }
            }
            slice
        })
        .collect();
    let occupied =
        |x: usize, y: usize, z: usize| -> bool { occupancy[z][y * verts + x] };

    let triangles: Vec<Triangle> = (0..cells)
        .into_par_iter()
        .flat_map_iter(|z| {
            let mut out = Vec::new();
            for y in 0..cells {
                for x in 0..cells {
                    mesh_cell(
                        solid,
                        &mut out,
                        [x, y, z],
                        &lattice_point,
                        &occupied,
                    );
                }
            }
            out.into_iter()
        })
        .collect();

    Mesh::new(triangles)
}

/// Corner offsets by bitmask: bit 0 = x, bit 1 = y, bit 2 = z.
#[inline]
fn corner(base: [usize; 3], mask: usize) -> [usize; 3] {
    [
        base[0] + (mask & 1),
        base[1] + ((mask >> 1) & 1),
        base[2] + ((mask >> 2) & 1),
    ]
}

/// The six tetrahedra of the Freudenthal cube split, as corner bitmasks.
/// Each follows an axis permutation from corner 0 to corner 7.
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

fn mesh_cell<S: Solid>(
    solid: &S,
    out: &mut Vec<Triangle>,
    base: [usize; 3],
    lattice_point: &impl Fn(usize, usize, usize) -> Vec3<f64>,
    occupied: &impl Fn(usize, usize, usize) -> bool,
) {
    let mut points = [Vec3::zero(); 8];
    let mut inside = [false; 8];
    let mut any = false;
    let mut all = true;
    for mask in 0..8 {
        let [x, y, z] = corner(base, mask);
        points[mask] = lattice_point(x, y, z);
        inside[mask] = occupied(x, y, z);
        any |= inside[mask];
        all &= inside[mask];
    }
    if !any || all {
        return;
    }

    for tet in &TETRAHEDRA {
        mesh_tetrahedron(solid, out, tet.map(|m| points[m]), tet.map(|m| inside[m]));
    }
}

/// Crossing point on an edge from an inside point to an outside point.
///
/// Bisection keeps the computation identical for every tetrahedron sharing
/// the edge, which keeps the mesh watertight.
fn surface_point<S: Solid>(solid: &S, inside: Vec3<f64>, outside: Vec3<f64>) -> Vec3<f64> {
    let mut lo = inside;
    let mut hi = outside;
    for _ in 0..BISECTION_ITERS {
        let mid = lo.mid(hi);
        if solid.contains(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo.mid(hi)
}

fn mesh_tetrahedron<S: Solid>(
    solid: &S,
    out: &mut Vec<Triangle>,
    points: [Vec3<f64>; 4],
    inside: [bool; 4],
) {
    let ins: Vec<usize> = (0..4).filter(|&i| inside[i]).collect();
    let outs: Vec<usize> = (0..4).filter(|&i| !inside[i]).collect();

    let emit = |out: &mut Vec<Triangle>, mut tri: Triangle, outward: Vec3<f64>| {
        if tri.raw_normal().dot(outward) < 0.0 {
            tri.vertices.swap(1, 2);
        }
        if tri.area() > 0.0 {
            out.push(tri);
        }
    };

    match ins.len() {
        1 => {
            let a = points[ins[0]];
            let cross: Vec<Vec3<f64>> = outs
                .iter()
                .map(|&o| surface_point(solid, a, points[o]))
                .collect();
            let tri = Triangle::new(cross[0], cross[1], cross[2]);
            let outward = tri.centroid() - a;
            emit(out, tri, outward);
        }
        3 => {
            let b = points[outs[0]];
            let cross: Vec<Vec3<f64>> = ins
                .iter()
                .map(|&i| surface_point(solid, points[i], b))
                .collect();
            let tri = Triangle::new(cross[0], cross[1], cross[2]);
            let outward = b - tri.centroid();
            emit(out, tri, outward);
        }
        2 => {
            let (i1, i2) = (points[ins[0]], points[ins[1]]);
            let (o1, o2) = (points[outs[0]], points[outs[1]]);
            let p11 = surface_point(solid, i1, o1);
            let p12 = surface_point(solid, i1, o2);
            let p21 = surface_point(solid, i2, o1);
            let p22 = surface_point(solid, i2, o2);
            let outward = o1.mid(o2) - i1.mid(i2);
            // Quad cycle p11 -> p12 -> p22 -> p21 (consecutive corners share
            // a tetrahedron vertex), fanned into two triangles.
            emit(out, Triangle::new(p11, p12, p22), outward);
            emit(out, Triangle::new(p11, p22, p21), outward);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::FuncSolid;
    use std::collections::HashMap;

    fn ball(radius: f64) -> FuncSolid<impl Fn(Vec3<f64>) -> bool + Sync> {
        FuncSolid {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
            contains: move |p: Vec3<f64>| p.norm() < radius,
        }
    }

    #[test]
    fn sphere_mesh_vertices_on_surface() {
        let solid = ball(0.7);
        let mesh = grid_mesh(&solid, 20);
        assert!(!mesh.is_empty());
        for t in &mesh.triangles {
            for v in &t.vertices {
                assert!(
                    (v.norm() - 0.7).abs() < 0.02,
                    "vertex {:?} off the sphere",
                    v
                );
            }
        }
    }

    #[test]
    fn sphere_mesh_area_close_to_analytic() {
        let solid = ball(0.7);
        let mesh = grid_mesh(&solid, 32);
        let expected = 4.0 * std::f64::consts::PI * 0.7 * 0.7;
        let area = mesh.total_area();
        assert!(
            (area - expected).abs() / expected < 0.15,
            "area {} vs analytic {}",
            area,
            expected
        );
    }

    #[test]
    fn sphere_mesh_is_watertight() {
        // Every edge must be shared by exactly two triangles (opposite
        // orientations), keyed by exact vertex bits.
        let solid = ball(0.6);
        let mesh = grid_mesh(&solid, 12);
        let key = |v: Vec3<f64>| (v.x.to_bits(), v.y.to_bits(), v.z.to_bits());
        let mut edges: HashMap<_, i64> = HashMap::new();
        for t in &mesh.triangles {
            for i in 0..3 {
                let a = key(t.vertices[i]);
                let b = key(t.vertices[(i + 1) % 3]);
                if a < b {
                    *edges.entry((a, b)).or_insert(0) += 1;
                } else {
                    *edges.entry((b, a)).or_insert(0) -= 1;
                }
            }
        }
        for (_, count) in edges {
            assert_eq!(count, 0, "unpaired edge in mesh");
        }
    }

    #[test]
    fn empty_solid_gives_empty_mesh() {
        let solid = FuncSolid {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
            contains: |_| false,
        };
        assert!(grid_mesh(&solid, 8).is_empty());
    }

    #[test]
    fn normals_point_outward() {
        let solid = ball(0.7);
        let mesh = grid_mesh(&solid, 16);
        let mut outward = 0;
        for t in &mesh.triangles {
            if t.normal().dot(t.centroid().normalize()) > 0.0 {
                outward += 1;
            }
        }
        assert!(
            outward as f64 / mesh.len() as f64 > 0.99,
            "{} / {} outward",
            outward,
            mesh.len()
        );
    }
}
