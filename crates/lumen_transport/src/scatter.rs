//! Scattering-length and Henyey-Greenstein direction sampling.

use lumen_math::DVec3;
use rand::Rng;

const EPS: f64 = 1e-6;

/// Sample a dimensionless free path, `-ln(ξ)` with ξ in (0, 1].
#[inline]
pub fn sample_scattering_length<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let xi: f64 = rng.gen();
    -(1.0 - xi).ln()
}

/// Sample cos θ from the Henyey-Greenstein phase function.
///
/// Falls back to isotropic sampling when `g` is close to zero.
#[inline]
pub fn sample_cos_theta<R: Rng + ?Sized>(g: f64, rng: &mut R) -> f64 {
    let xi: f64 = rng.gen();
    if g.abs() > EPS {
        let tmp = (1.0 - g * g) / (1.0 - g + 2.0 * g * xi);
        ((1.0 + g * g - tmp * tmp) / (2.0 * g)).clamp(-1.0, 1.0)
    } else {
        2.0 * xi - 1.0
    }
}

/// Rotate unit vector `dir` by polar angle θ and azimuth φ around itself.
///
/// Directions close to ±z use the frame of the z axis directly, avoiding
/// the division by `sqrt(1 - dz²)`.
pub fn rotate_direction(dir: DVec3, cos_theta: f64, phi: f64) -> DVec3 {
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let (sin_phi, cos_phi) = phi.sin_cos();

    if dir.z > -1.0 + EPS && dir.z < 1.0 - EPS {
        let tmp = 1.0 - dir.z * dir.z;
        let scale = sin_theta / tmp.sqrt();
        DVec3::new(
            scale * (dir.x * dir.z * cos_phi - dir.y * sin_phi) + dir.x * cos_theta,
            scale * (dir.y * dir.z * cos_phi + dir.x * sin_phi) + dir.y * cos_theta,
            -scale * tmp * cos_phi + dir.z * cos_theta,
        )
    } else {
        DVec3::new(
            sin_theta * cos_phi,
            sin_theta * sin_phi,
            if dir.z > 0.0 { cos_theta } else { -cos_theta },
        )
    }
}

/// Sample a new direction after a scattering event.
///
/// Returns the new direction and cos θ of the deflection.
pub fn scatter_direction<R: Rng + ?Sized>(g: f64, dir: DVec3, rng: &mut R) -> (DVec3, f64) {
    let phi = std::f64::consts::TAU * rng.gen::<f64>();
    let cos_theta = sample_cos_theta(g, rng);
    (rotate_direction(dir, cos_theta, phi).normalize(), cos_theta)
}
