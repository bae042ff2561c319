// Re-export glam for convenience
pub use glam::*;

// Lumen math types
mod aabb;
mod interval;
mod ray;

pub use aabb::Aabb;
pub use interval::Interval;
pub use ray::Ray;

/// Scalar triple product `a · (b × c)`.
///
/// Six times the signed volume of the tetrahedron spanned by the three edge
/// vectors.
#[inline]
pub fn triple_product(a: DVec3, b: DVec3, c: DVec3) -> f64 {
    a.dot(b.cross(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dvec3_operations() {
        let a = DVec3::new(1.0, 2.0, 3.0);
        let b = DVec3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, DVec3::new(5.0, 7.0, 9.0));
    }

    #[test]
    fn test_triple_product_sign() {
        // Right-handed basis gives +1
        assert_eq!(triple_product(DVec3::X, DVec3::Y, DVec3::Z), 1.0);
        // Swapping two edges flips the orientation
        assert_eq!(triple_product(DVec3::X, DVec3::Z, DVec3::Y), -1.0);
    }
}
