//! Ray-tracer precompute and face-crossing queries.
//!
//! A `RayTracer` is built once from a prepared mesh and then only read.
//! The variant is chosen by `TracerMethod`:
//!
//! - **Plucker**: edge lines per element, sign tests without division
//! - **Havel**: face planes with barycentric recovery, in-triangle check
//! - **Badouel**: same data as Havel, nearest forward plane hit
//! - **BadouelGrid**: normals only, output binned on a dual voxel grid

mod grid;
mod havel;
mod plucker;
mod prepare;

pub use grid::DualGrid;
pub use havel::{HavelElement, HavelFace};
pub use plucker::PluckerElement;
pub use prepare::{correct_surface_node_volumes, number_boundary_faces, prepare, region_reflectance, Preparation};

use lumen_math::{DVec3, Ray};
use lumen_mesh::TetMesh;

use crate::config::TracerMethod;
use crate::error::{TracerError, TracerResult};

/// Where a ray leaves the current element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceExit {
    /// Local face index (opposite local node `face`)
    pub face: usize,
    /// Distance from the ray origin to the exit point
    pub distance: f64,
    /// Exit point on the face
    pub point: DVec3,
}

#[derive(Debug, Clone)]
enum TracerData {
    Plucker(Vec<PluckerElement>),
    Havel(Vec<HavelElement>),
    Badouel(Vec<HavelElement>),
    BadouelGrid,
}

/// Precomputed per-element geometry for the selected exit test.
#[derive(Debug, Clone)]
pub struct RayTracer {
    method: TracerMethod,
    normals: Vec<[DVec3; 4]>,
    data: TracerData,
    grid: Option<DualGrid>,
}

impl RayTracer {
    /// Build tracer data for a volume-corrected mesh.
    ///
    /// `grid_step` is only used by `TracerMethod::BadouelGrid`.
    pub fn build(mesh: &TetMesh, method: TracerMethod, grid_step: DVec3) -> TracerResult<Self> {
        if mesh.nodes.is_empty() || mesh.elements.is_empty() {
            return Err(TracerError::IncompleteMesh("nodes and elements are required"));
        }
        if mesh.adjacency.len() != mesh.elements.len() {
            return Err(TracerError::IncompleteMesh("face adjacency"));
        }
        if mesh.element_volumes.len() != mesh.elements.len() {
            return Err(TracerError::IncompleteMesh("volumes not computed"));
        }
        if let Some(e) = mesh.element_volumes.iter().position(|v| *v <= 0.0) {
            return Err(TracerError::DegenerateElement(e));
        }

        let count = mesh.elements.len();
        let normals: Vec<[DVec3; 4]> = (0..count)
            .map(|e| std::array::from_fn(|face| mesh.face_normal(e, face).normalize()))
            .collect();

        let data = match method {
            TracerMethod::Plucker => {
                TracerData::Plucker((0..count).map(|e| PluckerElement::new(mesh, e)).collect())
            }
            TracerMethod::Havel => TracerData::Havel((0..count).map(|e| havel::build_element(mesh, e)).collect()),
            TracerMethod::Badouel => {
                TracerData::Badouel((0..count).map(|e| havel::build_element(mesh, e)).collect())
            }
            TracerMethod::BadouelGrid => TracerData::BadouelGrid,
        };

        let grid = match method {
            TracerMethod::BadouelGrid => Some(DualGrid::create_dual_mesh(mesh, grid_step)?),
            _ => None,
        };

        log::info!("Built {:?} tracer for {} elements", method, count);

        Ok(Self {
            method,
            normals,
            data,
            grid,
        })
    }

    pub fn method(&self) -> TracerMethod {
        self.method
    }

    /// Dual grid of the grid variant.
    pub fn grid(&self) -> Option<&DualGrid> {
        self.grid.as_ref()
    }

    /// Unit outward normal of a face.
    #[inline]
    pub fn normal(&self, element: usize, face: usize) -> DVec3 {
        self.normals[element][face]
    }

    /// Find where `ray`, starting inside `element`, leaves it.
    ///
    /// Returns `None` when no face qualifies, which only happens for
    /// inconsistent geometry or a ray origin outside the element.
    pub fn exit(&self, mesh: &TetMesh, element: usize, ray: &Ray) -> Option<FaceExit> {
        match &self.data {
            TracerData::Plucker(elements) => elements[element]
                .exit(mesh, element, ray)
                .or_else(|| grid::normal_exit(mesh, element, &self.normals[element], ray)),
            TracerData::Havel(elements) => havel::havel_exit(&elements[element], ray),
            TracerData::Badouel(elements) => havel::badouel_exit(&elements[element], ray),
            TracerData::BadouelGrid => grid::normal_exit(mesh, element, &self.normals[element], ray),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_mesh::{structured_box, Medium, Region};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const METHODS: [TracerMethod; 4] = [
        TracerMethod::Plucker,
        TracerMethod::Havel,
        TracerMethod::Badouel,
        TracerMethod::BadouelGrid,
    ];

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

    fn random_unit(rng: &mut StdRng) -> DVec3 {
        loop {
            let v = DVec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            let len2 = v.length_squared();
            if len2 > 1e-4 && len2 <= 1.0 {
                return v / len2.sqrt();
            }
        }
    }

    #[test]
    fn test_unit_tet_plucker_exit() {
        let mesh = TetMesh::new(
            vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z],
            vec![[0, 1, 2, 3]],
            vec![Region::Medium(1)],
            vec![Medium::ambient(1.0), Medium::new(0.0, 1.0, 0.0, 1.0)],
        )
        .map(|mut m| {
            m.compute_volumes();
            m
        })
        .unwrap();
        let tracer = RayTracer::build(&mesh, TracerMethod::Plucker, DVec3::ONE).unwrap();
        let exit = tracer.exit(&mesh, 0, &Ray::new(DVec3::splat(0.1), DVec3::Z)).unwrap();

        assert_eq!(exit.face, 0);
        assert!((exit.point - DVec3::new(0.1, 0.1, 0.8)).length() < 1e-12);
        assert!((exit.distance - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_all_methods_agree_on_random_rays() {
        let mesh = cube();
        let tracers: Vec<RayTracer> = METHODS
            .iter()
            .map(|m| RayTracer::build(&mesh, *m, DVec3::splat(0.5)).unwrap())
            .collect();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..500 {
            let e = rng.gen_range(0..mesh.element_count());
            let nodes = mesh.element_nodes(e);
            let w: [f64; 4] = std::array::from_fn(|_| rng.gen_range(0.05..1.0));
            let sum: f64 = w.iter().sum();
            let origin = (0..4).map(|k| nodes[k] * (w[k] / sum)).sum::<DVec3>();
            let ray = Ray::new(origin, random_unit(&mut rng));

            let exits: Vec<FaceExit> = tracers.iter().map(|t| t.exit(&mesh, e, &ray).unwrap()).collect();
            for exit in &exits[1..] {
                assert!((exit.distance - exits[0].distance).abs() < 1e-9);
                assert!((exit.point - exits[0].point).length() < 1e-9);
            }
            // Exit point lies on the reported face
            let bary = mesh.signed_barycentric(e, exits[0].point);
            assert!(bary[exits[0].face].abs() < 1e-9);
        }
    }

    #[test]
    fn test_build_rejects_missing_volumes() {
        let mut mesh = cube();
        mesh.element_volumes.clear();
        assert!(matches!(
            RayTracer::build(&mesh, TracerMethod::Havel, DVec3::ONE),
            Err(TracerError::IncompleteMesh(_))
        ));
    }

    #[test]
    fn test_grid_only_for_grid_method() {
        let mesh = cube();
        assert!(RayTracer::build(&mesh, TracerMethod::Plucker, DVec3::ONE).unwrap().grid().is_none());
        assert!(RayTracer::build(&mesh, TracerMethod::BadouelGrid, DVec3::ONE).unwrap().grid().is_some());
    }
}
