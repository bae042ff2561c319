//! Tetrahedral mesh representation for photon transport.
//!
//! `TetMesh` owns node coordinates, 4-node connectivity, per-element
//! regions, face adjacency, the media table and the derived element and
//! node volumes. Indices are 0-based everywhere; `from_one_based` is the
//! only place where host-style 1-based arrays are converted.

use lumen_math::{triple_product, Aabb, DVec3};

use crate::error::{MeshError, MeshResult};
use crate::medium::{Medium, Region};
use crate::roi::RoiOverlay;
use crate::topology::{face_neighbors, Adjacency, FACE_NODES};

/// A tetrahedral mesh with regions and optical media.
#[derive(Clone, Debug)]
pub struct TetMesh {
    /// Node positions
    pub nodes: Vec<DVec3>,

    /// Element connectivity (4 node indices per element)
    pub elements: Vec<[usize; 4]>,

    /// Region of each element
    pub regions: Vec<Region>,

    /// Face adjacency, face `j` opposite local node `j`
    pub adjacency: Vec<[Adjacency; 4]>,

    /// Media table, index 0 is the ambient medium
    pub media: Vec<Medium>,

    /// Element volumes (empty until `compute_volumes`)
    pub element_volumes: Vec<f64>,

    /// Node volumes, quarter-sum of adjacent tissue element volumes
    pub node_volumes: Vec<f64>,

    /// Optional implicit-geometry overlay
    pub roi: Option<RoiOverlay>,

    /// Candidate elements for wide-field source entry
    pub source_elements: Vec<usize>,

    /// Elements of the wide-field external detector
    pub detector_elements: Vec<usize>,

    /// Synthetic medium index assigned to detector elements
    pub detector_region: Option<usize>,
}

impl TetMesh {
    /// Create a mesh from 0-based arrays, deriving face adjacency.
    pub fn new(
        nodes: Vec<DVec3>,
        elements: Vec<[usize; 4]>,
        regions: Vec<Region>,
        media: Vec<Medium>,
    ) -> MeshResult<Self> {
        let adjacency = face_neighbors(&elements)?;
        Self::with_adjacency(nodes, elements, regions, adjacency, media)
    }

    /// Create a mesh from 0-based arrays with host-supplied adjacency.
    pub fn with_adjacency(
        nodes: Vec<DVec3>,
        elements: Vec<[usize; 4]>,
        regions: Vec<Region>,
        adjacency: Vec<[Adjacency; 4]>,
        media: Vec<Medium>,
    ) -> MeshResult<Self> {
        let mesh = Self {
            nodes,
            elements,
            regions,
            adjacency,
            media,
            element_volumes: Vec::new(),
            node_volumes: Vec::new(),
            roi: None,
            source_elements: Vec::new(),
            detector_elements: Vec::new(),
            detector_region: None,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Build a mesh from 1-based host arrays.
    ///
    /// `elements` rows hold 4 or 10 node ids; 10-node (quadratic) elements
    /// keep only their corner nodes. `labels` are raw region labels where
    /// -1 and -2 mark pending source and detector elements. Rows of
    /// `face_neighbors`, when given, list the neighbor across the face
    /// opposite local node `3 - k` in entry `k`, with 0 meaning none. When
    /// omitted, adjacency is derived from shared faces.
    pub fn from_one_based(
        nodes: Vec<DVec3>,
        elements: &[Vec<usize>],
        labels: &[i64],
        face_neighbors: Option<&[[usize; 4]]>,
        media: Vec<Medium>,
    ) -> MeshResult<Self> {
        if labels.len() != elements.len() {
            return Err(MeshError::LengthMismatch {
                what: "region labels",
                expected: elements.len(),
                found: labels.len(),
            });
        }

        let node_count = nodes.len();
        let mut elems = Vec::with_capacity(elements.len());
        for (e, row) in elements.iter().enumerate() {
            if row.len() != 4 && row.len() != 10 {
                return Err(MeshError::BadElementArity {
                    element: e,
                    found: row.len(),
                });
            }
            let mut elem = [0usize; 4];
            for (slot, &id) in elem.iter_mut().zip(row.iter()) {
                if id == 0 || id > node_count {
                    return Err(MeshError::NodeOutOfRange {
                        element: e,
                        node: id,
                        count: node_count,
                    });
                }
                *slot = id - 1;
            }
            elems.push(elem);
        }

        let regions = labels
            .iter()
            .enumerate()
            .map(|(e, &label)| Region::from_label(label).ok_or(MeshError::InvalidLabel { element: e, label }))
            .collect::<MeshResult<Vec<_>>>()?;

        match face_neighbors {
            None => Self::new(nodes, elems, regions, media),
            Some(rows) => {
                if rows.len() != elems.len() {
                    return Err(MeshError::LengthMismatch {
                        what: "face neighbors",
                        expected: elems.len(),
                        found: rows.len(),
                    });
                }
                let element_count = elems.len();
                let mut adjacency = Vec::with_capacity(element_count);
                for (e, row) in rows.iter().enumerate() {
                    let mut faces = [Adjacency::Open; 4];
                    for (k, &nb) in row.iter().enumerate() {
                        faces[3 - k] = match nb {
                            0 => Adjacency::Open,
                            id if id <= element_count => Adjacency::Neighbor(id - 1),
                            id => {
                                return Err(MeshError::NeighborOutOfRange {
                                    element: e,
                                    face: 3 - k,
                                    neighbor: id,
                                })
                            }
                        };
                    }
                    adjacency.push(faces);
                }
                Self::with_adjacency(nodes, elems, regions, adjacency, media)
            }
        }
    }

    /// Attach an ROI overlay, checking its length against the mesh.
    pub fn with_roi(mut self, roi: RoiOverlay) -> MeshResult<Self> {
        let expected = match roi {
            RoiOverlay::Node(_) => self.nodes.len(),
            RoiOverlay::Edge(_) | RoiOverlay::Face(_) => self.elements.len(),
        };
        if roi.len() != expected {
            return Err(MeshError::LengthMismatch {
                what: "roi overlay",
                expected,
                found: roi.len(),
            });
        }
        self.roi = Some(roi);
        Ok(self)
    }

    /// Check that the mesh is complete and self-consistent.
    pub fn validate(&self) -> MeshResult<()> {
        if self.nodes.is_empty() {
            return Err(MeshError::NoNodes);
        }
        if self.elements.is_empty() {
            return Err(MeshError::NoElements);
        }
        if self.media.is_empty() {
            return Err(MeshError::NoMedia);
        }
        for (what, found) in [("regions", self.regions.len()), ("adjacency", self.adjacency.len())] {
            if found != self.elements.len() {
                return Err(MeshError::LengthMismatch {
                    what,
                    expected: self.elements.len(),
                    found,
                });
            }
        }

        let node_count = self.nodes.len();
        for (e, elem) in self.elements.iter().enumerate() {
            if let Some(&node) = elem.iter().find(|&&n| n >= node_count) {
                return Err(MeshError::NodeOutOfRange {
                    element: e,
                    node,
                    count: node_count,
                });
            }
            if let Region::Medium(region) = self.regions[e] {
                if region >= self.media.len() {
                    return Err(MeshError::RegionOutOfRange {
                        element: e,
                        region,
                        count: self.media.len(),
                    });
                }
            }
            for (face, adj) in self.adjacency[e].iter().enumerate() {
                if let Adjacency::Neighbor(nb) = adj {
                    if *nb >= self.elements.len() {
                        return Err(MeshError::NeighborOutOfRange {
                            element: e,
                            face,
                            neighbor: *nb,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Replace the adjacency table with one derived from shared faces.
    pub fn compute_face_neighbors(&mut self) -> MeshResult<()> {
        self.adjacency = face_neighbors(&self.elements)?;
        Ok(())
    }

    /// Compute element and node volumes, fixing inverted elements.
    ///
    /// An element with negative signed volume gets nodes 2 and 3 swapped,
    /// along with its face adjacency and ROI entries, so every face normal
    /// from `FACE_NODES` points outward. Node volumes collect a quarter of
    /// each tissue element's volume. Running this twice is a no-op.
    pub fn compute_volumes(&mut self) {
        self.element_volumes = vec![0.0; self.elements.len()];
        self.node_volumes = vec![0.0; self.nodes.len()];
        let mut flipped = 0usize;

        for e in 0..self.elements.len() {
            let [a, b, c, d] = self.elements[e].map(|n| self.nodes[n]);
            let mut volume = triple_product(b - a, c - a, d - a);

            if volume < 0.0 {
                self.elements[e].swap(2, 3);
                self.adjacency[e].swap(2, 3);
                if let Some(roi) = self.roi.as_mut() {
                    roi.swap_nodes_2_3(e);
                }
                volume = -volume;
                flipped += 1;
            }

            let volume = volume / 6.0;
            self.element_volumes[e] = volume;

            if volume == 0.0 {
                log::warn!("Element {} is degenerate (zero volume)", e);
            }

            if !self.is_tissue(e) {
                continue;
            }
            for &n in &self.elements[e] {
                self.node_volumes[n] += volume * 0.25;
            }
        }

        if flipped > 0 {
            log::debug!("Fixed winding of {} inverted elements", flipped);
        }
    }

    /// Resolve pending source and detector markers.
    ///
    /// Source candidates are recorded and become void elements. Detector
    /// elements are recorded and moved to a synthetic medium appended to the
    /// media table, a copy of the ambient medium. Returns an error if the
    /// media table is empty or the element arrays disagree in length.
    pub fn classify_source_detector_elements(&mut self) -> MeshResult<()> {
        if self.media.is_empty() {
            return Err(MeshError::NoMedia);
        }
        if self.regions.len() != self.elements.len() {
            return Err(MeshError::LengthMismatch {
                what: "regions",
                expected: self.elements.len(),
                found: self.regions.len(),
            });
        }

        for (e, region) in self.regions.iter_mut().enumerate() {
            match region {
                Region::PendingSource => {
                    self.source_elements.push(e);
                    *region = Region::Medium(0);
                }
                Region::PendingDetector => self.detector_elements.push(e),
                Region::Medium(_) => {}
            }
        }

        if !self.detector_elements.is_empty() {
            let detector_region = match self.detector_region {
                Some(r) => r,
                None => {
                    self.media.push(self.media[0]);
                    self.media.len() - 1
                }
            };
            for &e in &self.detector_elements {
                self.regions[e] = Region::Medium(detector_region);
            }
            self.detector_region = Some(detector_region);
        }

        log::debug!(
            "Classified {} source candidate and {} detector elements",
            self.source_elements.len(),
            self.detector_elements.len()
        );
        Ok(())
    }

    /// Convert tissue μa/μs from 1/mm to 1/(mesh unit).
    ///
    /// The ambient medium and the synthetic detector medium are untouched.
    pub fn scale_media(&mut self, unit_in_mm: f64) {
        if unit_in_mm == 1.0 {
            return;
        }
        let end = self.tissue_media_end();
        for medium in &mut self.media[1..end] {
            medium.mua *= unit_in_mm;
            medium.mus *= unit_in_mm;
        }
    }

    /// One past the last real tissue medium index.
    pub fn tissue_media_end(&self) -> usize {
        self.detector_region.unwrap_or(self.media.len()).max(1)
    }

    /// True if the element contributes to node volumes and absorption.
    pub fn is_tissue(&self, element: usize) -> bool {
        match self.regions[element] {
            Region::Medium(m) => m != 0 && Some(m) != self.detector_region,
            Region::PendingSource | Region::PendingDetector => false,
        }
    }

    /// Medium of an element.
    #[inline]
    pub fn medium(&self, element: usize) -> &Medium {
        &self.media[self.regions[element].medium_index()]
    }

    /// Corner positions of an element.
    #[inline]
    pub fn element_nodes(&self, element: usize) -> [DVec3; 4] {
        self.elements[element].map(|n| self.nodes[n])
    }

    /// Vertices of face `face` of `element`, in outward winding.
    #[inline]
    pub fn face_vertices(&self, element: usize, face: usize) -> [DVec3; 3] {
        let elem = &self.elements[element];
        FACE_NODES[face].map(|local| self.nodes[elem[local]])
    }

    /// Unnormalized outward normal of a face (length is twice its area).
    pub fn face_normal(&self, element: usize, face: usize) -> DVec3 {
        let [a, b, c] = self.face_vertices(element, face);
        (b - a).cross(c - a)
    }

    /// Barycentric weights of `point` in `element`, normalized to sum 1.
    ///
    /// Weight `j` belongs to local node `j` and is negative when the point
    /// lies outside face `j`.
    pub fn signed_barycentric(&self, element: usize, point: DVec3) -> [f64; 4] {
        let mut weights = [0.0; 4];
        for (j, w) in weights.iter_mut().enumerate() {
            let [a, b, c] = self.face_vertices(element, j);
            *w = -(point - a).dot((b - a).cross(c - a));
        }
        let sum: f64 = weights.iter().sum();
        if sum != 0.0 {
            for w in &mut weights {
                *w /= sum;
            }
        }
        weights
    }

    /// Barycentric weights if `point` lies inside or on `element`.
    pub fn barycentric(&self, element: usize, point: DVec3) -> Option<[f64; 4]> {
        let mut weights = [0.0; 4];
        let mut sum = 0.0;
        for (j, w) in weights.iter_mut().enumerate() {
            let [a, b, c] = self.face_vertices(element, j);
            *w = -(point - a).dot((b - a).cross(c - a));
            if *w < 0.0 {
                return None;
            }
            sum += *w;
        }
        if sum <= 0.0 {
            return None;
        }
        Some(weights.map(|w| w / sum))
    }

    /// Axis-aligned bounds of an element.
    pub fn element_bounds(&self, element: usize) -> Aabb {
        Aabb::enclosing(self.element_nodes(element))
    }

    /// Axis-aligned bounds of all nodes.
    pub fn bounds(&self) -> Aabb {
        Aabb::enclosing(self.nodes.iter().copied())
    }

    /// Find the first non-void element enclosing `point`.
    ///
    /// Linear scan with a bounding-box rejection before the exact test.
    /// Void elements (medium 0, including classified source candidates)
    /// are skipped, so a point on a tissue/void interface resolves to the
    /// tissue side. Meant for one-off source setup, not per-step queries.
    pub fn locate_enclosing_element(&self, point: DVec3) -> Option<(usize, [f64; 4])> {
        (0..self.elements.len())
            .filter(|&e| !self.regions[e].is_void() && self.element_bounds(e).contains(point))
            .find_map(|e| self.barycentric(e, point).map(|bary| (e, bary)))
    }

    /// Number of exposed faces (numbered or not).
    pub fn exposed_face_count(&self) -> usize {
        self.adjacency.iter().flatten().filter(|a| a.is_exposed()).count()
    }

    /// Number of elements.
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
