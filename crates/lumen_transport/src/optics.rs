//! Fresnel optics at refractive-index interfaces.

use lumen_math::DVec3;

/// Reflection and transmission at an interface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fresnel {
    /// Unpolarized reflectance in [0, 1]
    pub reflectance: f64,
    /// Cosine of the transmitted angle (0 under total internal reflection)
    pub cos_t: f64,
}

impl Fresnel {
    /// Fresnel coefficients for light going from `n1` into `n2`.
    ///
    /// `cos_i` is the cosine between the propagation direction and the
    /// interface normal, taken positive.
    pub fn new(n1: f64, n2: f64, cos_i: f64) -> Self {
        let cos_i = cos_i.abs().min(1.0);
        let eta = n1 / n2;
        let sin_t2 = eta * eta * (1.0 - cos_i * cos_i);
        if sin_t2 >= 1.0 {
            return Self {
                reflectance: 1.0,
                cos_t: 0.0,
            };
        }
        let cos_t = (1.0 - sin_t2).sqrt();
        let rs = (n1 * cos_i - n2 * cos_t) / (n1 * cos_i + n2 * cos_t);
        let rp = (n1 * cos_t - n2 * cos_i) / (n1 * cos_t + n2 * cos_i);
        Self {
            reflectance: (0.5 * (rs * rs + rp * rp)).clamp(0.0, 1.0),
            cos_t,
        }
    }

    #[inline]
    pub fn is_total(&self) -> bool {
        self.reflectance >= 1.0
    }
}

/// Mirror `dir` about the plane with unit normal `normal`.
#[inline]
pub fn reflect(dir: DVec3, normal: DVec3) -> DVec3 {
    dir - 2.0 * dir.dot(normal) * normal
}

/// Snell refraction through a plane with unit normal `normal`.
///
/// `normal` points along the direction of travel (`dir · normal > 0`),
/// `eta = n1 / n2` and `cos_t` comes from `Fresnel::new`.
#[inline]
pub fn refract(dir: DVec3, normal: DVec3, eta: f64, cos_t: f64) -> DVec3 {
    let cos_i = dir.dot(normal);
    (eta * dir + (cos_t - eta * cos_i) * normal).normalize()
}

/// Angle-integrated internal reflectance of a boundary.
///
/// 1000-step quadrature of the Fresnel reflectance over the polar angle,
/// weighted by the fluence (`2 sin cos`) and current (`3 sin cos²`) kernels.
/// Angles beyond the critical angle reflect fully.
pub fn effective_reflectance(n_in: f64, n_out: f64) -> f64 {
    const COUNT: usize = 1000;
    let step = std::f64::consts::FRAC_PI_2 / COUNT as f64;
    let critical = if n_in > n_out {
        (n_out / n_in).asin()
    } else {
        std::f64::consts::FRAC_PI_2
    };

    let mut r_phi = 0.0;
    let mut r_j = 0.0;
    for i in 0..COUNT {
        let o = i as f64 * step;
        let (sin_o, cos_o) = o.sin_cos();
        let r = if o < critical {
            let sin_t = n_in * sin_o / n_out;
            let cos_t = (1.0 - sin_t * sin_t).max(0.0).sqrt();
            let rs = (n_in * cos_t - n_out * cos_o) / (n_in * cos_t + n_out * cos_o);
            let rp = (n_in * cos_o - n_out * cos_t) / (n_in * cos_o + n_out * cos_t);
            0.5 * (rs * rs + rp * rp)
        } else {
            1.0
        };
        r_phi += 2.0 * sin_o * cos_o * r;
        r_j += 3.0 * sin_o * cos_o * cos_o * r;
    }
    r_phi *= step;
    r_j *= step;
    (r_phi + r_j) / (2.0 - r_phi + r_j)
}

/// Polynomial fit of `effective_reflectance`.
///
/// Only meaningful for `n_in >= n_out`; the result is clamped to `[0, 1)`.
pub fn effective_reflectance_approx(n_in: f64, n_out: f64) -> f64 {
    let nn = n_in / n_out;
    let r = -1.440 / (nn * nn) + 0.710 / nn + 0.668 + 0.0636 * nn;
    r.clamp(0.0, 1.0 - f64::EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matched_index_has_no_reflection() {
        let f = Fresnel::new(1.37, 1.37, 0.6);
        assert!(f.reflectance < 1e-12);
        assert!((f.cos_t - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_normal_incidence_reflectance() {
        // ((n1 - n2) / (n1 + n2))^2
        let f = Fresnel::new(1.0, 1.5, 1.0);
        assert!((f.reflectance - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_total_internal_reflection() {
        let f = Fresnel::new(1.5, 1.0, 0.1);
        assert!(f.is_total());
    }

    #[test]
    fn test_reflect_preserves_length() {
        let d = DVec3::new(1.0, 1.0, 0.0).normalize();
        let r = reflect(d, DVec3::Y);
        assert!((r - DVec3::new(1.0, -1.0, 0.0).normalize()).length() < 1e-12);
    }

    #[test]
    fn test_refract_obeys_snell() {
        let n1 = 1.37;
        let n2 = 1.0;
        let d = DVec3::new(0.3, 0.0, 1.0).normalize();
        let f = Fresnel::new(n1, n2, d.z);
        let t = refract(d, DVec3::Z, n1 / n2, f.cos_t);

        let sin_i = (1.0 - d.z * d.z).sqrt();
        let sin_t = (1.0 - t.z * t.z).sqrt();
        assert!((n1 * sin_i - n2 * sin_t).abs() < 1e-9);
        assert!(t.z > 0.0);
    }

    #[test]
    fn test_reff_bounds() {
        for &n_in in &[1.1, 1.33, 1.37, 1.5, 2.0, 3.0] {
            let r = effective_reflectance(n_in, 1.0);
            assert!((0.0..1.0).contains(&r), "Reff({}) = {}", n_in, r);
        }
        assert!(effective_reflectance(1.37, 1.37).abs() < 1e-9);
        assert!(effective_reflectance(1.0, 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reff_close_to_fit() {
        let exact = effective_reflectance(1.4, 1.0);
        let approx = effective_reflectance_approx(1.4, 1.0);
        assert!((exact - approx).abs() < 0.05, "{} vs {}", exact, approx);
    }

    #[test]
    fn test_reff_fit_stays_in_range() {
        assert_eq!(effective_reflectance_approx(1.0, 1.4), 0.0);
        assert!(effective_reflectance_approx(1.0, 1.0) < 0.01);
    }
}
