//! Region-of-interest overlays for implicit sub-element geometry.
//!
//! An overlay attaches a scalar (a radius or thickness, 0 meaning "none") to
//! every edge, node or face of the mesh. Transport-side acceleration
//! precomputes, per element, either how many of its own edges/faces carry
//! data or which nearby element does.

use serde::{Deserialize, Serialize};

use crate::topology::Adjacency;

/// Per-edge, per-node or per-face scalar field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoiOverlay {
    /// Six values per element, ordered like `EDGE_PAIRS`
    Edge(Vec<[f64; 6]>),
    /// One value per node
    Node(Vec<f64>),
    /// Four values per element, ordered like the faces
    Face(Vec<[f64; 4]>),
}

/// Acceleration entry for one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoiRef {
    /// Neither this element nor its searched neighborhood carries ROI data
    None,
    /// Number of this element's own edges/faces that carry ROI data
    Count(u8),
    /// Nearest element (1 or 2 hops away) that carries ROI data
    Neighbor(usize),
}

impl RoiOverlay {
    /// Number of entries the overlay holds (elements, or nodes for `Node`).
    pub fn len(&self) -> usize {
        match self {
            RoiOverlay::Edge(v) => v.len(),
            RoiOverlay::Node(v) => v.len(),
            RoiOverlay::Face(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep per-element entries consistent after nodes 2 and 3 of `element`
    /// were swapped.
    pub(crate) fn swap_nodes_2_3(&mut self, element: usize) {
        match self {
            RoiOverlay::Edge(v) => {
                // (0,2)<->(0,3) and (1,2)<->(1,3)
                v[element].swap(1, 2);
                v[element].swap(3, 4);
            }
            RoiOverlay::Face(v) => v[element].swap(2, 3),
            RoiOverlay::Node(_) => {}
        }
    }

    fn own_count(&self, element: usize) -> u8 {
        match self {
            RoiOverlay::Edge(v) => v[element].iter().filter(|r| **r > 0.0).count() as u8,
            RoiOverlay::Face(v) => v[element].iter().filter(|r| **r > 0.0).count() as u8,
            RoiOverlay::Node(_) => 0,
        }
    }

    /// Build per-element acceleration entries.
    ///
    /// Edge overlays search 1- and 2-hop face neighbors, face overlays only
    /// direct neighbors. Node overlays need no acceleration and return `None`.
    pub fn acceleration(&self, adjacency: &[[Adjacency; 4]]) -> Option<Vec<RoiRef>> {
        let hops = match self {
            RoiOverlay::Edge(_) => 2,
            RoiOverlay::Face(_) => 1,
            RoiOverlay::Node(_) => return None,
        };

        let counts: Vec<u8> = (0..adjacency.len()).map(|e| self.own_count(e)).collect();
        let has_roi = |e: usize| counts[e] > 0;

        let refs = (0..adjacency.len())
            .map(|e| {
                if has_roi(e) {
                    return RoiRef::Count(counts[e]);
                }

                let first = adjacency[e].iter().filter_map(Adjacency::neighbor);
                if let Some(nb) = first.clone().find(|nb| has_roi(*nb)) {
                    return RoiRef::Neighbor(nb);
                }

                if hops > 1 {
                    for nb in first {
                        if let Some(second) = adjacency[nb]
                            .iter()
                            .filter_map(Adjacency::neighbor)
                            .find(|id| has_roi(*id))
                        {
                            return RoiRef::Neighbor(second);
                        }
                    }
                }

                RoiRef::None
            })
            .collect();

        Some(refs)
    }
}
