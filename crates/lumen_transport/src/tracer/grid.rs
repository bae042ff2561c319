//! Dual voxel grid used by the grid output variant.

use lumen_math::{Aabb, DVec3, Ray};
use lumen_mesh::TetMesh;
use serde::{Deserialize, Serialize};

use super::FaceExit;
use crate::error::{ConfigError, ConfigResult};

const PAD: f64 = 1e-6;
/// Largest grid the accumulator is allowed to allocate.
const MAX_VOXELS: usize = 1 << 30;

/// Regular voxel grid covering the padded mesh bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualGrid {
    /// Minimum corner of voxel (0, 0, 0)
    pub origin: DVec3,
    /// Voxel edge lengths
    pub step: DVec3,
    /// Voxel counts per axis
    pub dims: [usize; 3],
}

impl DualGrid {
    /// Voxelize the bounds of `mesh` with the given voxel size.
    ///
    /// Fails when the voxel count is not finite or does not fit the
    /// accumulator.
    pub fn create_dual_mesh(mesh: &TetMesh, step: DVec3) -> ConfigResult<Self> {
        let bounds: Aabb = mesh.bounds().padded(PAD);
        let counts = bounds.extent() / step;
        let too_large = || ConfigError::GridTooLarge {
            step: step.to_array(),
            counts: counts.to_array(),
        };
        if !counts.is_finite() || counts.min_element() < 0.0 || counts.max_element() >= MAX_VOXELS as f64 {
            return Err(too_large());
        }
        let dims = [
            counts.x as usize + 1,
            counts.y as usize + 1,
            counts.z as usize + 1,
        ];
        let total = dims.iter().try_fold(1usize, |acc, n| acc.checked_mul(*n));
        if !matches!(total, Some(n) if n <= MAX_VOXELS) {
            return Err(too_large());
        }
        log::debug!("Dual grid {:?} voxels of {:?}", dims, step);
        Ok(Self {
            origin: bounds.min(),
            step,
            dims,
        })
    }

    /// Number of voxels; bounded by construction.
    pub fn voxel_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// Volume of one voxel in mesh units.
    pub fn voxel_volume(&self) -> f64 {
        self.step.x * self.step.y * self.step.z
    }

    /// Linear voxel index of a point, clamped into the grid.
    pub fn voxel_index(&self, p: DVec3) -> usize {
        let cell = ((p - self.origin) / self.step).floor();
        let clamp = |v: f64, n: usize| (v.max(0.0) as usize).min(n - 1);
        let [nx, ny, nz] = self.dims;
        let (i, j, k) = (clamp(cell.x, nx), clamp(cell.y, ny), clamp(cell.z, nz));
        i + nx * (j + ny * k)
    }

    /// Smallest voxel edge, used to pick the sub-sampling length.
    pub fn min_step(&self) -> f64 {
        self.step.min_element()
    }
}

/// Normal-only exit test: nearest forward plane hit.
pub fn normal_exit(mesh: &TetMesh, element: usize, normals: &[DVec3; 4], ray: &Ray) -> Option<FaceExit> {
    let mut best: Option<(usize, f64)> = None;
    for (face, normal) in normals.iter().enumerate() {
        let cos = ray.direction.dot(*normal);
        if cos <= 0.0 {
            continue;
        }
        let [a, _, _] = mesh.face_vertices(element, face);
        let t = ((a - ray.origin).dot(*normal) / cos).max(0.0);
        if best.map_or(true, |(_, b)| t < b) {
            best = Some((face, t));
        }
    }
    best.map(|(face, distance)| FaceExit {
        face,
        distance,
        point: ray.at(distance),
    })
}
