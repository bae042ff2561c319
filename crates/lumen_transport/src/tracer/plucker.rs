//! Plücker-coordinate exit test.
//!
//! A ray and an edge line are compared through the permuted inner product
//! `π = d_ray · m_edge + d_edge · m_ray`, whose sign tells on which side of
//! the edge the ray passes. The exit face is the one whose three directed
//! edges all give `π >= 0`; the products double as barycentric weights of
//! the exit point, so selection needs no division.

use lumen_math::{DVec3, Ray};
use lumen_mesh::{TetMesh, EDGE_PAIRS};

use super::FaceExit;

/// Directed edges of each face as (edge index, orientation), following the
/// outward winding A→B, B→C, C→A of `FACE_NODES`.
const FACE_EDGES: [[(usize, f64); 3]; 4] = [
    [(3, 1.0), (5, 1.0), (4, -1.0)],
    [(2, 1.0), (5, -1.0), (1, -1.0)],
    [(0, 1.0), (4, 1.0), (2, -1.0)],
    [(1, 1.0), (3, -1.0), (0, -1.0)],
];

/// Precomputed edge lines of one element.
#[derive(Debug, Clone, Copy)]
pub struct PluckerElement {
    /// Edge directions `b - a`
    pub d: [DVec3; 6],
    /// Edge moments `a × b`
    pub m: [DVec3; 6],
}

impl PluckerElement {
    pub fn new(mesh: &TetMesh, element: usize) -> Self {
        let nodes = mesh.element_nodes(element);
        let mut d = [DVec3::ZERO; 6];
        let mut m = [DVec3::ZERO; 6];
        for (i, [a, b]) in EDGE_PAIRS.iter().enumerate() {
            d[i] = nodes[*b] - nodes[*a];
            m[i] = nodes[*a].cross(nodes[*b]);
        }
        Self { d, m }
    }

    /// Find the face through which `ray` leaves the element.
    pub fn exit(&self, mesh: &TetMesh, element: usize, ray: &Ray) -> Option<FaceExit> {
        let dir = ray.direction;
        let moment = ray.moment();
        let pi: [f64; 6] = std::array::from_fn(|e| dir.dot(self.m[e]) + self.d[e].dot(moment));

        for (face, edges) in FACE_EDGES.iter().enumerate() {
            let [ab, bc, ca] = edges.map(|(e, sign)| sign * pi[e]);
            let sum = ab + bc + ca;
            if ab < 0.0 || bc < 0.0 || ca < 0.0 || sum <= 0.0 {
                continue;
            }
            let [a, b, c] = mesh.face_vertices(element, face);
            let point = (a * bc + b * ca + c * ab) / sum;
            let distance = (point - ray.origin).dot(dir).max(0.0);
            return Some(FaceExit { face, distance, point });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_mesh::FACE_NODES;

    #[test]
    fn test_face_edges_follow_face_winding() {
        for (face, edges) in FACE_EDGES.iter().enumerate() {
            let nodes = FACE_NODES[face];
            for (k, (e, sign)) in edges.iter().enumerate() {
                let from = nodes[k];
                let to = nodes[(k + 1) % 3];
                let [a, b] = EDGE_PAIRS[*e];
                if *sign > 0.0 {
                    assert_eq!((a, b), (from, to));
                } else {
                    assert_eq!((a, b), (to, from));
                }
            }
        }
    }
}
