//! One-time mesh preparation before transport.
//!
//! Numbers the exposed faces and optionally corrects surface node volumes.
//! After `prepare` the mesh is frozen.

use lumen_mesh::{Adjacency, TetMesh, FACE_NODES};

use crate::config::{Basis, ReffModel, SimConfig, SurfaceNormalization, TracerMethod};
use crate::error::{TracerError, TracerResult};
use crate::optics::{effective_reflectance, effective_reflectance_approx};

/// Results of the preparation pass.
#[derive(Debug, Clone, Default)]
pub struct Preparation {
    /// Number of exposed faces, numbered `Boundary(0..count)`
    pub boundary_faces: usize,
    /// Effective reflectance per medium index
    pub reff: Vec<f64>,
    /// Nodes whose volume was rescaled
    pub corrected_nodes: usize,
}

/// Number every exposed face `Boundary(0..K)` in element-major order.
///
/// Renumbers from scratch, so calling it again yields the same ids.
pub fn number_boundary_faces(mesh: &mut TetMesh) -> usize {
    let mut next = 0;
    for faces in &mut mesh.adjacency {
        for adj in faces.iter_mut() {
            if adj.is_exposed() {
                *adj = Adjacency::Boundary(next);
                next += 1;
            }
        }
    }
    next
}

/// Effective reflectance of each medium against the ambient medium.
///
/// All zeros when reflection is disabled. Media sharing a refractive index
/// reuse the same result.
pub fn region_reflectance(mesh: &TetMesh, reflect: bool, model: ReffModel) -> Vec<f64> {
    let mut reff = vec![0.0; mesh.media.len()];
    if !reflect {
        return reff;
    }
    let n_out = mesh.media[0].n;
    for i in 1..mesh.media.len() {
        let n_in = mesh.media[i].n;
        reff[i] = match (1..i).find(|&j| mesh.media[j].n == n_in) {
            Some(j) => reff[j],
            None => match model {
                ReffModel::Quadrature => effective_reflectance(n_in, n_out),
                ReffModel::Fit => effective_reflectance_approx(n_in, n_out),
            },
        };
    }
    reff
}

/// Scale volumes of nodes on exposed faces by `2 / (1 + Reff)`.
///
/// Surface nodes only see half the solid angle of an interior node. The
/// factor is exact for flat surfaces only. Each node is scaled at most once
/// and nodes without volume are left alone.
pub fn correct_surface_node_volumes(mesh: &mut TetMesh, reff: &[f64]) -> usize {
    let mut done = vec![false; mesh.nodes.len()];
    let mut corrected = 0;

    for e in 0..mesh.elements.len() {
        let region = mesh.regions[e].medium_index();
        let factor = 2.0 / (1.0 + reff.get(region).copied().unwrap_or(0.0));
        for face in 0..4 {
            if !mesh.adjacency[e][face].is_exposed() {
                continue;
            }
            for local in FACE_NODES[face] {
                let node = mesh.elements[e][local];
                if !done[node] && mesh.node_volumes[node] > 0.0 {
                    mesh.node_volumes[node] *= factor;
                    done[node] = true;
                    corrected += 1;
                }
            }
        }
    }
    corrected
}

/// Prepare a volume-corrected mesh for transport.
pub fn prepare(mesh: &mut TetMesh, config: &SimConfig) -> TracerResult<Preparation> {
    if mesh.nodes.is_empty() {
        return Err(TracerError::IncompleteMesh("no nodes"));
    }
    if mesh.elements.is_empty() {
        return Err(TracerError::IncompleteMesh("no elements"));
    }
    if mesh.adjacency.len() != mesh.elements.len() {
        return Err(TracerError::IncompleteMesh("face adjacency"));
    }
    if mesh.element_volumes.len() != mesh.elements.len() || mesh.node_volumes.len() != mesh.nodes.len() {
        return Err(TracerError::IncompleteMesh("volumes not computed"));
    }

    let reff = region_reflectance(mesh, config.reflect, config.reff_model);

    let wants_correction = config.normalize
        && config.surface_normalization == SurfaceNormalization::Approximate
        && config.basis == Basis::Node
        && config.method != TracerMethod::BadouelGrid;
    let corrected_nodes = if wants_correction {
        correct_surface_node_volumes(mesh, &reff)
    } else {
        0
    };

    let boundary_faces = number_boundary_faces(mesh);

    log::info!(
        "Prepared mesh: {} boundary faces, {} surface nodes rescaled",
        boundary_faces,
        corrected_nodes
    );

    Ok(Preparation {
        boundary_faces,
        reff,
        corrected_nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_math::DVec3;
    use lumen_mesh::{structured_box, Medium, Region};
    use std::collections::HashSet;

    fn cube() -> TetMesh {
        structured_box(
            DVec3::ZERO,
            DVec3::splat(2.0),
            [2, 2, 2],
            vec![Medium::ambient(1.0), Medium::new(0.01, 1.0, 0.9, 1.37)],
            |_| Region::Medium(1),
        )
        .unwrap()
    }

    #[test]
    fn test_boundary_ids_are_dense_and_unique() {
        let mut mesh = cube();
        let expected = mesh.exposed_face_count();
        let count = number_boundary_faces(&mut mesh);

        let ids: HashSet<usize> = mesh.adjacency.iter().flatten().filter_map(|a| a.boundary_id()).collect();
        assert_eq!(count, expected);
        assert_eq!(ids.len(), count);
        assert_eq!(ids, (0..count).collect::<HashSet<_>>());

        // Renumbering is stable
        let before = mesh.adjacency.clone();
        assert_eq!(number_boundary_faces(&mut mesh), count);
        assert_eq!(mesh.adjacency, before);
    }

    #[test]
    fn test_surface_correction_applies_once() {
        let mut mesh = cube();
        let before = mesh.node_volumes.clone();
        let reff = vec![0.0, 0.0];
        let corrected = correct_surface_node_volumes(&mut mesh, &reff);

        // 27 nodes, only the center one is interior
        assert_eq!(corrected, 26);
        let center = 13;
        assert_eq!(mesh.node_volumes[center], before[center]);
        for n in (0..27).filter(|n| *n != center) {
            assert!((mesh.node_volumes[n] - 2.0 * before[n]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_reflectance_zero_without_reflect() {
        let mesh = cube();
        assert_eq!(region_reflectance(&mesh, false, ReffModel::Quadrature), vec![0.0, 0.0]);
        let r = region_reflectance(&mesh, true, ReffModel::Quadrature);
        assert_eq!(r[0], 0.0);
        assert!(r[1] > 0.4 && r[1] < 0.5);
    }

    #[test]
    fn test_fit_model_drives_surface_correction() {
        let fit = region_reflectance(&cube(), true, ReffModel::Fit);
        assert_eq!(fit[1], effective_reflectance_approx(1.37, 1.0));

        let config = SimConfig::default().with_reff_model(ReffModel::Fit);
        let mut mesh = cube();
        let before = mesh.node_volumes.clone();
        let prep = prepare(&mut mesh, &config).unwrap();
        assert_eq!(prep.reff, fit);
        // Corner node 0 is scaled by 2 / (1 + Reff) of the fit
        let expected = before[0] * 2.0 / (1.0 + fit[1]);
        assert!((mesh.node_volumes[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_prepare_requires_volumes() {
        let mut mesh = cube();
        mesh.element_volumes.clear();
        assert!(matches!(
            prepare(&mut mesh, &SimConfig::default()),
            Err(TracerError::IncompleteMesh(_))
        ));
    }
}
