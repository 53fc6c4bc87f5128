//! Convex polytope to triangle mesh conversion.
//!
//! Used by the sphere collider: each "true" leaf cell of a bounded tree is a
//! convex polytope, and sphere queries run against its surface mesh.

use crate::geom::{Coord, Polytope, Vec3};

use super::{Mesh, Triangle};

const EPS: f64 = 1e-9;

/// Mesh the boundary of a bounded, non-degenerate convex polytope.
///
/// Vertices are enumerated as feasible intersections of constraint triples;
/// each face's vertices are sorted around the face centroid and fanned into
/// triangles wound so normals point out of the polytope. An infeasible or
/// unbounded polytope yields an empty mesh.
pub fn convex_polytope_mesh(polytope: &Polytope<f64, Vec3<f64>>) -> Mesh {
    let constraints = polytope.constraints();
    let n = constraints.len();

    // All feasible triple intersections, deduplicated.
    let mut vertices: Vec<Vec3<f64>> = Vec::new();
    // Constraint index -> indices into `vertices` lying on that plane.
    let mut face_vertices: Vec<Vec<usize>> = vec![Vec::new(); n];

    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let Some(point) = intersect_planes(polytope, i, j, k) else {
                    continue;
                };
                let feasible = constraints
                    .iter()
                    .all(|c| point.dot(c.axis) <= c.max + EPS * (1.0 + c.max.abs()));
                if !feasible {
                    continue;
                }
                let idx = match vertices
                    .iter()
                    .position(|&v| v.dist(point) < EPS * (1.0 + point.norm()))
                {
                    Some(idx) => idx,
                    None => {
                        vertices.push(point);
                        vertices.len() - 1
                    }
                };
                for face in [i, j, k] {
                    if !face_vertices[face].contains(&idx) {
                        face_vertices[face].push(idx);
                    }
                }
            }
        }
    }

    let mut triangles = Vec::new();
    for (face, indices) in face_vertices.iter().enumerate() {
        if indices.len() < 3 {
            continue;
        }
        let axis = constraints[face].axis;
        let normal = axis.scale(1.0 / axis.norm());

        let centroid = indices
            .iter()
            .fold(Vec3::zero(), |acc, &i| acc + vertices[i])
            .scale(1.0 / indices.len() as f64);

        // Order the face polygon by angle around its centroid.
        let u = perpendicular(normal);
        let v = normal.cross(u);
        let mut ordered: Vec<Vec3<f64>> = indices.iter().map(|&i| vertices[i]).collect();
        ordered.sort_by(|a, b| {
            let pa = *a - centroid;
            let pb = *b - centroid;
            let ang_a = pa.dot(v).atan2(pa.dot(u));
            let ang_b = pb.dot(v).atan2(pb.dot(u));
            ang_a.partial_cmp(&ang_b).unwrap_or(std::cmp::Ordering::Equal)
        });

        for w in 1..ordered.len() - 1 {
            let mut tri = Triangle::new(ordered[0], ordered[w], ordered[w + 1]);
            if tri.raw_normal().dot(normal) < 0.0 {
                tri.vertices.swap(1, 2);
            }
            if tri.area() > 0.0 {
                triangles.push(tri);
            }
        }
    }

    Mesh::new(triangles)
}

/// Solve the 3x3 system putting a point on three constraint planes.
fn intersect_planes(
    polytope: &Polytope<f64, Vec3<f64>>,
    i: usize,
    j: usize,
    k: usize,
) -> Option<Vec3<f64>> {
    let c = polytope.constraints();
    let (a1, a2, a3) = (c[i].axis, c[j].axis, c[k].axis);
    let b = Vec3::new(c[i].max, c[j].max, c[k].max);

    // Cramer's rule over the column vectors of the coefficient matrix.
    let col_x = Vec3::new(a1.x, a2.x, a3.x);
    let col_y = Vec3::new(a1.y, a2.y, a3.y);
    let col_z = Vec3::new(a1.z, a2.z, a3.z);

    let det = col_x.dot(col_y.cross(col_z));
    let scale = a1.norm() * a2.norm() * a3.norm();
    if det.abs() < 1e-12 * scale.max(f64::MIN_POSITIVE) {
        return None;
    }

    let det_x = b.dot(col_y.cross(col_z));
    let det_y = col_x.dot(b.cross(col_z));
    let det_z = col_x.dot(col_y.cross(b));
    Some(Vec3::new(det_x / det, det_y / det, det_z / det))
}

/// Any unit vector perpendicular to `v` (which must be unit length).
fn perpendicular(v: Vec3<f64>) -> Vec3<f64> {
    let candidate = if v.x.abs() < 0.9 {
        Vec3::x_axis()
    } else {
        Vec3::y_axis()
    };
    let p = candidate - v.scale(candidate.dot(v));
    p.scale(1.0 / p.norm())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Polytope;
    use approx::assert_relative_eq;

    #[test]
    fn unit_cube_meshes_exactly() {
        let cube = Polytope::cube(Vec3::splat(-1.0), Vec3::splat(1.0));
        let mesh = convex_polytope_mesh(&cube);
        // 6 faces, 2 triangles each.
        assert_eq!(mesh.len(), 12);
        assert_relative_eq!(mesh.total_area(), 24.0, epsilon = 1e-6);
        assert_eq!(mesh.min(), Vec3::splat(-1.0));
        assert_eq!(mesh.max(), Vec3::splat(1.0));
    }

    #[test]
    fn cube_normals_point_outward() {
        let cube = Polytope::cube(Vec3::splat(0.0), Vec3::splat(2.0));
        let mesh = convex_polytope_mesh(&cube);
        let center = Vec3::splat(1.0);
        for t in &mesh.triangles {
            assert!(t.normal().dot(t.centroid() - center) > 0.0);
        }
    }

    #[test]
    fn sliced_cube_has_seven_faces() {
        let sliced = Polytope::cube(Vec3::splat(-1.0), Vec3::splat(1.0))
            .constrain(Vec3::new(1.0, 1.0, 1.0).normalize(), 1.0);
        let mesh = convex_polytope_mesh(&sliced);
        assert!(!mesh.is_empty());
        // The cut reduces the area below the full cube's.
        assert!(mesh.total_area() < 24.0);
        // All vertices satisfy the new constraint.
        let axis = Vec3::new(1.0, 1.0, 1.0).normalize();
        for t in &mesh.triangles {
            for v in &t.vertices {
                assert!(v.dot(axis) <= 1.0 + 1e-6);
            }
        }
    }

    #[test]
    fn unbounded_polytope_gives_empty_mesh() {
        let slab = Polytope::cube(Vec3::splat(-1.0), Vec3::splat(1.0));
        let only_two = Polytope::new(slab.constraints()[..2].to_vec());
        assert!(convex_polytope_mesh(&only_two).is_empty());
    }
}
