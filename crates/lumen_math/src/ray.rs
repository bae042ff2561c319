use crate::{DVec3, Interval};

/// Straight flight segment of a photon.
///
/// `direction` is kept normalized by the transport code, so ray parameters
/// are physical lengths in mesh units.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self { origin, direction }
    }

    /// Plücker moment of the ray line, `origin × direction`.
    #[inline]
    pub fn moment(&self) -> DVec3 {
        self.origin.cross(self.direction)
    }

    #[inline]
    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }

    /// Möller-Trumbore ray-triangle intersection.
    ///
    /// Returns the ray parameter of the hit if it lies within `ray_t`.
    pub fn hit_triangle(&self, v0: DVec3, v1: DVec3, v2: DVec3, ray_t: Interval) -> Option<f64> {
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        let h = self.direction.cross(edge2);
        let a = edge1.dot(h);

        // Ray is parallel to triangle
        if a.abs() < 1e-12 {
            return None;
        }

        let f = 1.0 / a;
        let s = self.origin - v0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * self.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(q);
        ray_t.contains(t).then_some(t)
    }
}
