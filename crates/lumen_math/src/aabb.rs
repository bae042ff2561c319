use crate::{DVec3, Interval};
use serde::{Deserialize, Serialize};

/// Axis-aligned box, one `Interval` per axis.
///
/// Used for the cheap rejection pass of point location and for sizing the
/// voxel grid of the dual-mesh output.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub x: Interval,
    pub y: Interval,
    pub z: Interval,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        x: Interval::EMPTY,
        y: Interval::EMPTY,
        z: Interval::EMPTY,
    };

    /// Box spanned by two opposite corners, in any order.
    pub fn from_points(a: DVec3, b: DVec3) -> Self {
        Self::EMPTY.include(a).include(b)
    }

    /// Smallest box holding every point; `EMPTY` when there are none.
    pub fn enclosing<I: IntoIterator<Item = DVec3>>(points: I) -> Self {
        points.into_iter().fold(Aabb::EMPTY, |acc, p| acc.include(p))
    }

    pub fn include(&self, p: DVec3) -> Self {
        Self {
            x: self.x.include(p.x),
            y: self.y.include(p.y),
            z: self.z.include(p.z),
        }
    }

    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            x: self.x.union(&other.x),
            y: self.y.union(&other.y),
            z: self.z.union(&other.z),
        }
    }

    /// Points on the faces count as inside.
    #[inline]
    pub fn contains(&self, p: DVec3) -> bool {
        self.x.contains(p.x) && self.y.contains(p.y) && self.z.contains(p.z)
    }

    /// Grow every side by `margin`.
    pub fn padded(&self, margin: f64) -> Self {
        Self {
            x: self.x.pad(margin),
            y: self.y.pad(margin),
            z: self.z.pad(margin),
        }
    }

    pub fn min(&self) -> DVec3 {
        DVec3::new(self.x.min, self.y.min, self.z.min)
    }

    pub fn max(&self) -> DVec3 {
        DVec3::new(self.x.max, self.y.max, self.z.max)
    }

    /// Edge lengths along each axis.
    pub fn extent(&self) -> DVec3 {
        DVec3::new(self.x.size(), self.y.size(), self.z.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners_in_any_order() {
        let aabb = Aabb::from_points(DVec3::new(4.0, 0.0, 4.0), DVec3::new(0.0, 4.0, 0.0));
        assert_eq!(aabb.min(), DVec3::ZERO);
        assert_eq!(aabb.max(), DVec3::splat(4.0));
    }

    #[test]
    fn test_enclosing_tetrahedron() {
        let aabb = Aabb::enclosing([
            DVec3::new(-1.0, 2.0, 0.5),
            DVec3::new(3.0, -2.0, 0.0),
            DVec3::new(0.0, 0.0, 4.0),
            DVec3::new(0.5, 0.5, 0.5),
        ]);
        assert_eq!(aabb.min(), DVec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.extent(), DVec3::splat(4.0));
        assert_eq!(Aabb::enclosing(std::iter::empty()), Aabb::EMPTY);
    }

    #[test]
    fn test_face_points_are_inside() {
        let aabb = Aabb::from_points(DVec3::ZERO, DVec3::ONE);
        assert!(aabb.contains(DVec3::new(1.0, 0.5, 0.0)));
        assert!(!aabb.contains(DVec3::new(1.0, 1.0, 1.0001)));
    }

    #[test]
    fn test_padded_union() {
        let a = Aabb::from_points(DVec3::ZERO, DVec3::ONE).padded(0.5);
        assert_eq!(a.min(), DVec3::splat(-0.5));

        let b = Aabb::from_points(DVec3::splat(2.0), DVec3::splat(3.0));
        let joined = a.union(&b);
        assert_eq!(joined.min(), DVec3::splat(-0.5));
        assert_eq!(joined.max(), DVec3::splat(3.0));
    }
}
