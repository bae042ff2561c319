//! Havel and Badouel face-normal exit tests.
//!
//! Each face stores its unit normal plus two vectors scaled by the inverse
//! squared face area. Dotting the hit offset `X - A` with them yields the
//! barycentric parameters `(u, v)` of the ray/plane hit directly.

use lumen_math::{DVec3, Ray};
use lumen_mesh::TetMesh;

use super::FaceExit;

const BARY_TOLERANCE: f64 = 1e-9;

/// Precomputed plane data of one face.
#[derive(Debug, Clone, Copy)]
pub struct HavelFace {
    /// A vertex of the face
    pub origin: DVec3,
    /// Unit outward normal
    pub normal: DVec3,
    /// `(C - A) × N / |N|²`, gives the weight of vertex B
    pub n1: DVec3,
    /// `N × (B - A) / |N|²`, gives the weight of vertex C
    pub n2: DVec3,
}

impl HavelFace {
    pub fn new(mesh: &TetMesh, element: usize, face: usize) -> Self {
        let [a, b, c] = mesh.face_vertices(element, face);
        let ab = b - a;
        let ac = c - a;
        let n = ab.cross(ac);
        let inv_area2 = 1.0 / n.length_squared();
        Self {
            origin: a,
            normal: n.normalize(),
            n1: ac.cross(n) * inv_area2,
            n2: n.cross(ab) * inv_area2,
        }
    }

    /// Ray parameter of the plane hit when the ray leaves through this face.
    #[inline]
    fn forward_hit(&self, ray: &Ray) -> Option<f64> {
        let cos = ray.direction.dot(self.normal);
        if cos <= 0.0 {
            return None;
        }
        Some(((self.origin - ray.origin).dot(self.normal) / cos).max(0.0))
    }

    /// Barycentric `(u, v)` of a point on the face plane.
    #[inline]
    pub fn uv(&self, point: DVec3) -> (f64, f64) {
        let offset = point - self.origin;
        (offset.dot(self.n1), offset.dot(self.n2))
    }
}

pub type HavelElement = [HavelFace; 4];

pub fn build_element(mesh: &TetMesh, element: usize) -> HavelElement {
    std::array::from_fn(|face| HavelFace::new(mesh, element, face))
}

/// Nearest forward hit whose barycentric parameters lie in the triangle.
///
/// Falls back to the nearest forward plane hit when rounding pushes every
/// candidate slightly outside its triangle.
pub fn havel_exit(faces: &HavelElement, ray: &Ray) -> Option<FaceExit> {
    let mut inside: Option<(usize, f64)> = None;
    for (face, data) in faces.iter().enumerate() {
        let Some(t) = data.forward_hit(ray) else {
            continue;
        };
        let (u, v) = data.uv(ray.at(t));
        let in_triangle = u >= -BARY_TOLERANCE && v >= -BARY_TOLERANCE && u + v <= 1.0 + BARY_TOLERANCE;
        if in_triangle && inside.map_or(true, |(_, best)| t < best) {
            inside = Some((face, t));
        }
    }

    match inside {
        Some((face, distance)) => Some(FaceExit {
            face,
            distance,
            point: ray.at(distance),
        }),
        None => badouel_exit(faces, ray),
    }
}

/// Nearest forward plane hit.
pub fn badouel_exit(faces: &HavelElement, ray: &Ray) -> Option<FaceExit> {
    faces
        .iter()
        .enumerate()
        .filter_map(|(face, data)| data.forward_hit(ray).map(|t| (face, t)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(face, distance)| FaceExit {
            face,
            distance,
            point: ray.at(distance),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_mesh::{Medium, Region};

    fn unit_tet() -> TetMesh {
        TetMesh::new(
            vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z],
            vec![[0, 1, 2, 3]],
            vec![Region::Medium(1)],
            vec![Medium::ambient(1.0), Medium::new(0.0, 1.0, 0.0, 1.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_uv_recovers_vertices() {
        let mesh = unit_tet();
        let face = HavelFace::new(&mesh, 0, 0);
        let [_, b, c] = mesh.face_vertices(0, 0);

        let (u, v) = face.uv(b);
        assert!((u - 1.0).abs() < 1e-12 && v.abs() < 1e-12);
        let (u, v) = face.uv(c);
        assert!(u.abs() < 1e-12 && (v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_havel_and_badouel_agree() {
        let mesh = unit_tet();
        let faces = build_element(&mesh, 0);
        let ray = Ray::new(DVec3::splat(0.1), DVec3::new(1.0, 0.2, -0.05).normalize());

        let h = havel_exit(&faces, &ray).unwrap();
        let b = badouel_exit(&faces, &ray).unwrap();
        assert_eq!(h.face, b.face);
        assert!((h.distance - b.distance).abs() < 1e-12);
    }
}
