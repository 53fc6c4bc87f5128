//! Exact plane cuts of triangles and meshes.

use crate::geom::{Coord, Vec3};

use super::{Mesh, Triangle};

/// Split a mesh across the plane `p . axis = threshold`.
///
/// Triangles straddling the plane are cut exactly (two pieces on one side,
/// one on the other), so the union of the two results reproduces the input
/// surface.
pub fn split_mesh(mesh: &Mesh, axis: Vec3<f64>, threshold: f64) -> (Mesh, Mesh) {
    let mut less_than = Vec::new();
    let mut greater_equal = Vec::new();
    for t in &mesh.triangles {
        let (lt, ge) = split_triangle(t, axis, threshold);
        less_than.extend(lt);
        greater_equal.extend(ge);
    }
    (Mesh::new(less_than), Mesh::new(greater_equal))
}

/// Split one triangle across a plane.
///
/// Returns the pieces on the less-than and greater-equal sides. A triangle
/// whose plane intersection degenerates to a vertex (within rounding) is
/// assigned whole to one side.
pub fn split_triangle(
    triangle: &Triangle,
    axis: Vec3<f64>,
    threshold: f64,
) -> (Vec<Triangle>, Vec<Triangle>) {
    let signs: [bool; 3] = std::array::from_fn(|i| triangle.vertices[i].dot(axis) >= threshold);

    if signs[0] == signs[1] && signs[1] == signs[2] {
        return if signs[0] {
            (vec![], vec![*triangle])
        } else {
            (vec![*triangle], vec![])
        };
    }

    // Two vertices share the majority side; the minority vertex is cut off.
    let majority = signs.iter().filter(|&&s| s).count() == 2;

    let mut maj_loop: Vec<Vec3<f64>> = Vec::with_capacity(4);
    let mut min_loop: Vec<Vec3<f64>> = Vec::with_capacity(3);
    for i in 0..3 {
        let j = (i + 1) % 3;
        let p1 = triangle.vertices[i];
        if signs[i] == signs[j] {
            maj_loop.push(p1);
            continue;
        }

        // Edge crossing: o + alpha * r lies on the plane.
        let p2 = triangle.vertices[j];
        let r = p2 - p1;
        let alpha = (threshold - axis.dot(p1)) / axis.dot(r);

        // Rounding pushed the crossing outside the edge; treat the triangle
        // as entirely on one side.
        if alpha <= 0.0 {
            return if signs[j] {
                (vec![], vec![*triangle])
            } else {
                (vec![*triangle], vec![])
            };
        } else if alpha >= 1.0 {
            return if signs[i] {
                (vec![], vec![*triangle])
            } else {
                (vec![*triangle], vec![])
            };
        }

        let mid_point = p1 + r.scale(alpha);

        if signs[i] == majority {
            maj_loop.push(p1);
        } else {
            min_loop.push(p1);
        }
        maj_loop.push(mid_point);
        min_loop.push(mid_point);
    }

    let maj_tris = vec![
        Triangle::new(maj_loop[0], maj_loop[1], maj_loop[3]),
        Triangle::new(maj_loop[1], maj_loop[2], maj_loop[3]),
    ];
    let min_tris = vec![Triangle::new(min_loop[0], min_loop[1], min_loop[2])];

    if majority {
        (min_tris, maj_tris)
    } else {
        (maj_tris, min_tris)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn total_area(tris: &[Triangle]) -> f64 {
        tris.iter().map(Triangle::area).sum()
    }

    #[test]
    fn proper_cut_preserves_area_and_normals() {
        let mut triangle = Triangle::new(
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.1),
            Vec3::new(1.0, 1.0, -0.1),
        );
        let axis = Vec3::new(0.01, 0.9, 0.01).normalize();
        let threshold = 0.1;

        let (lt, ge) = split_triangle(&triangle, axis, threshold);
        assert_eq!(lt.len(), 2);
        assert_eq!(ge.len(), 1);

        let normal = triangle.normal();
        for piece in lt.iter().chain(ge.iter()) {
            assert!(
                piece.normal().dot(normal) > 1.0 - 1e-5,
                "piece normal {:?} disagrees with {:?}",
                piece.normal(),
                normal
            );
        }
        assert_relative_eq!(
            total_area(&lt) + total_area(&ge),
            triangle.area(),
            epsilon = 1e-5
        );

        // Vertex rotations must produce equivalent pieces.
        let (lt_area, ge_area) = (total_area(&lt), total_area(&ge));
        for _ in 0..2 {
            triangle.vertices.rotate_left(1);
            let (lt2, ge2) = split_triangle(&triangle, axis, threshold);
            assert_eq!(lt2.len(), lt.len());
            assert_eq!(ge2.len(), ge.len());
            assert_relative_eq!(total_area(&lt2), lt_area, epsilon = 1e-5);
            assert_relative_eq!(total_area(&ge2), ge_area, epsilon = 1e-5);
            for piece in lt2.iter().chain(ge2.iter()) {
                assert!(piece.normal().dot(normal) > 1.0 - 1e-5);
            }
        }
    }

    #[test]
    fn untouched_triangle_stays_whole() {
        let triangle = Triangle::new(
            Vec3::zero(),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        );
        let (lt, ge) = split_triangle(&triangle, Vec3::z_axis(), 5.0);
        assert_eq!(lt.len(), 1);
        assert!(ge.is_empty());

        let (lt, ge) = split_triangle(&triangle, Vec3::z_axis(), -5.0);
        assert!(lt.is_empty());
        assert_eq!(ge.len(), 1);
    }

    #[test]
    fn split_mesh_partitions_every_triangle() {
        let mesh = Mesh::new(vec![
            Triangle::new(
                Vec3::new(-1.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ),
            Triangle::new(
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(3.0, 0.0, 0.0),
                Vec3::new(2.0, 1.0, 0.0),
            ),
        ]);
        let (lt, ge) = split_mesh(&mesh, Vec3::x_axis(), 0.0);
        assert_relative_eq!(
            lt.total_area() + ge.total_area(),
            mesh.total_area(),
            epsilon = 1e-9
        );
        assert!(lt.triangles.iter().all(|t| t.max().x <= 1e-9));
    }
}
