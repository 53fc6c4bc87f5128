//! Icosphere vertex generation.
//!
//! Split searches use the vertices of a subdivided icosahedron as evenly
//! distributed candidate axes.

use std::collections::HashMap;

use super::vector::{Coord, Vec3};

/// Vertices of a unit icosphere with `resolution` subdivision rounds.
///
/// Resolution 0 is the icosahedron itself (12 vertices); each round splits
/// every face into four and projects the new vertices onto the sphere,
/// yielding `10 * 4^r + 2` vertices.
pub fn icosphere_vertices(resolution: usize) -> Vec<Vec3<f64>> {
    // Golden-ratio icosahedron.
    let phi = (1.0 + 5.0f64.sqrt()) / 2.0;
    let mut vertices: Vec<Vec3<f64>> = [
        (-1.0, phi, 0.0),
        (1.0, phi, 0.0),
        (-1.0, -phi, 0.0),
        (1.0, -phi, 0.0),
        (0.0, -1.0, phi),
        (0.0, 1.0, phi),
        (0.0, -1.0, -phi),
        (0.0, 1.0, -phi),
        (phi, 0.0, -1.0),
        (phi, 0.0, 1.0),
        (-phi, 0.0, -1.0),
        (-phi, 0.0, 1.0),
    ]
    .iter()
    .map(|&(x, y, z)| Vec3::new(x, y, z).normalize())
    .collect();

    let mut faces: Vec<[usize; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..resolution {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut next_faces = Vec::with_capacity(faces.len() * 4);
        for face in &faces {
            let mut mids = [0usize; 3];
            for i in 0..3 {
                let a = face[i];
                let b = face[(i + 1) % 3];
                let key = (a.min(b), a.max(b));
                mids[i] = *midpoints.entry(key).or_insert_with(|| {
                    let mid = vertices[a].mid(vertices[b]).normalize();
                    vertices.push(mid);
                    vertices.len() - 1
                });
            }
            next_faces.push([face[0], mids[0], mids[2]]);
            next_faces.push([face[1], mids[1], mids[0]]);
            next_faces.push([face[2], mids[2], mids[1]]);
            next_faces.push([mids[0], mids[1], mids[2]]);
        }
        faces = next_faces;
    }

    vertices
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn vertex_counts() {
        assert_eq!(icosphere_vertices(0).len(), 12);
        assert_eq!(icosphere_vertices(1).len(), 42);
        assert_eq!(icosphere_vertices(2).len(), 162);
    }

    #[test]
    fn vertices_on_unit_sphere() {
        for v in icosphere_vertices(2) {
            assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-12);
        }
    }
}
