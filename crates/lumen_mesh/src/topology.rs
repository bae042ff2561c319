//! Local face/edge numbering and face adjacency.
//!
//! Face `j` of an element is the triangle opposite local node `j`. Its
//! nodes are listed in `FACE_NODES[j]`, ordered so that
//! `(B - A) × (C - A)` points out of a positively wound element.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{MeshError, MeshResult};

/// Local node indices of each face, outward winding.
pub const FACE_NODES: [[usize; 3]; 4] = [[1, 2, 3], [0, 3, 2], [0, 1, 3], [0, 2, 1]];

/// Local node indices of the six edges.
pub const EDGE_PAIRS: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];

/// What lies across one face of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Adjacency {
    /// Another element shares this face
    Neighbor(usize),
    /// Exposed face that has not been numbered yet
    Open,
    /// Exposed face with its sequential boundary id
    Boundary(usize),
}

impl Adjacency {
    #[inline]
    pub fn neighbor(&self) -> Option<usize> {
        match self {
            Adjacency::Neighbor(e) => Some(*e),
            _ => None,
        }
    }

    /// True for both numbered and unnumbered exposed faces.
    #[inline]
    pub fn is_exposed(&self) -> bool {
        !matches!(self, Adjacency::Neighbor(_))
    }

    #[inline]
    pub fn boundary_id(&self) -> Option<usize> {
        match self {
            Adjacency::Boundary(id) => Some(*id),
            _ => None,
        }
    }
}

/// Sorted global node ids of face `face` of `element`.
pub fn face_key(element: &[usize; 4], face: usize) -> [usize; 3] {
    let mut key = FACE_NODES[face].map(|local| element[local]);
    key.sort_unstable();
    key
}

/// Derive face adjacency from shared triangles.
///
/// Faces that no other element shares come back as `Adjacency::Open`.
pub fn face_neighbors(elements: &[[usize; 4]]) -> MeshResult<Vec<[Adjacency; 4]>> {
    let mut owners: HashMap<[usize; 3], Vec<(usize, usize)>> = HashMap::with_capacity(elements.len() * 2);

    for (e, element) in elements.iter().enumerate() {
        for face in 0..4 {
            owners.entry(face_key(element, face)).or_default().push((e, face));
        }
    }

    let mut adjacency = vec![[Adjacency::Open; 4]; elements.len()];
    for sharing in owners.values() {
        match sharing.as_slice() {
            [_] => {}
            [(a, fa), (b, fb)] => {
                adjacency[*a][*fa] = Adjacency::Neighbor(*b);
                adjacency[*b][*fb] = Adjacency::Neighbor(*a);
            }
            _ => {
                let element = sharing.iter().map(|(e, _)| *e).min().unwrap_or_default();
                return Err(MeshError::NonManifoldFace { element });
            }
        }
    }

    Ok(adjacency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_key_is_sorted() {
        let element = [7, 3, 9, 1];
        assert_eq!(face_key(&element, 0), [1, 3, 9]);
        assert_eq!(face_key(&element, 3), [3, 7, 9]);
    }

    #[test]
    fn test_every_face_excludes_its_opposite_node() {
        for (j, face) in FACE_NODES.iter().enumerate() {
            assert!(!face.contains(&j));
        }
    }

    #[test]
    fn test_two_tets_share_one_face() {
        // Two tets glued on nodes {1, 2, 3}
        let elements = [[0, 1, 2, 3], [4, 1, 3, 2]];
        let adjacency = face_neighbors(&elements).unwrap();

        assert_eq!(adjacency[0][0], Adjacency::Neighbor(1));
        assert_eq!(adjacency[1][0], Adjacency::Neighbor(0));
        let open = adjacency.iter().flatten().filter(|a| **a == Adjacency::Open).count();
        assert_eq!(open, 6);
    }

    #[test]
    fn test_three_way_face_is_rejected() {
        let elements = [[0, 1, 2, 3], [4, 1, 2, 3], [5, 1, 2, 3]];
        assert!(matches!(
            face_neighbors(&elements),
            Err(MeshError::NonManifoldFace { .. })
        ));
    }
}
