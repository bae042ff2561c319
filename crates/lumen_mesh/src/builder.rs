//! Structured box phantoms.
//!
//! Each grid cell is split into six tetrahedra sharing the cell diagonal
//! (Kuhn subdivision). Neighboring cells use the same split, so the result is
//! conforming and face adjacency can be derived from shared triangles.

use lumen_math::DVec3;

use crate::error::{MeshError, MeshResult};
use crate::medium::{Medium, Region};
use crate::mesh::TetMesh;

// Axis orderings walked from corner (0,0,0) to corner (1,1,1)
const KUHN_PATHS: [[usize; 3]; 6] = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

/// Build a box-shaped tetrahedral mesh spanning `min..max`.
///
/// `cells` is the number of grid cells per axis. `region_of` receives each
/// element's centroid and returns its region, which lets callers paint
/// layers or mark source/detector elements. The returned mesh has adjacency
/// and volumes computed.
pub fn structured_box(
    min: DVec3,
    max: DVec3,
    cells: [usize; 3],
    media: Vec<Medium>,
    region_of: impl Fn(DVec3) -> Region,
) -> MeshResult<TetMesh> {
    let extent = max - min;
    if cells.contains(&0) || extent.min_element() <= 0.0 {
        return Err(MeshError::EmptyGrid);
    }

    let [nx, ny, nz] = cells;
    let step = extent / DVec3::new(nx as f64, ny as f64, nz as f64);
    let node_id = |i: usize, j: usize, k: usize| i + (nx + 1) * (j + (ny + 1) * k);

    let mut nodes = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                nodes.push(min + step * DVec3::new(i as f64, j as f64, k as f64));
            }
        }
    }

    let mut elements = Vec::with_capacity(nx * ny * nz * 6);
    let mut regions = Vec::with_capacity(nx * ny * nz * 6);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                for path in KUHN_PATHS {
                    let mut corner = [i, j, k];
                    let mut elem = [node_id(i, j, k); 4];
                    for (slot, axis) in path.iter().enumerate() {
                        corner[*axis] += 1;
                        elem[slot + 1] = node_id(corner[0], corner[1], corner[2]);
                    }
                    let centroid = elem.iter().map(|&n| nodes[n]).sum::<DVec3>() * 0.25;
                    elements.push(elem);
                    regions.push(region_of(centroid));
                }
            }
        }
    }

    let mut mesh = TetMesh::new(nodes, elements, regions, media)?;
    mesh.compute_volumes();

    log::debug!(
        "Built box phantom: {} nodes, {} elements",
        mesh.node_count(),
        mesh.element_count()
    );
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media() -> Vec<Medium> {
        vec![Medium::ambient(1.0), Medium::new(0.01, 1.0, 0.9, 1.37)]
    }

    #[test]
    fn test_box_volume_sums_to_extent() {
        let mesh = structured_box(DVec3::ZERO, DVec3::new(2.0, 3.0, 4.0), [2, 3, 2], media(), |_| {
            Region::Medium(1)
        })
        .unwrap();

        let total: f64 = mesh.element_volumes.iter().sum();
        assert!((total - 24.0).abs() < 1e-9);
        let nodal: f64 = mesh.node_volumes.iter().sum();
        assert!((nodal - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_box_boundary_face_count() {
        let mesh = structured_box(DVec3::ZERO, DVec3::ONE, [2, 2, 2], media(), |_| Region::Medium(1)).unwrap();

        // Each cell face on the surface splits into 2 triangles
        assert_eq!(mesh.exposed_face_count(), 6 * 4 * 2);
    }

    #[test]
    fn test_box_rejects_empty_grid() {
        let result = structured_box(DVec3::ZERO, DVec3::ONE, [0, 1, 1], media(), |_| Region::Medium(1));
        assert!(matches!(result, Err(MeshError::EmptyGrid)));
    }
}
