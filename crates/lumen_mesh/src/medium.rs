//! Optical media and per-element region labels.

use serde::{Deserialize, Serialize};

/// Optical properties of one region.
///
/// Coefficients are in 1/mm until `TetMesh::scale_media` converts them to
/// mesh length units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Medium {
    /// Absorption coefficient μa
    pub mua: f64,
    /// Scattering coefficient μs
    pub mus: f64,
    /// Henyey-Greenstein anisotropy g
    pub g: f64,
    /// Refractive index
    pub n: f64,
}

impl Medium {
    pub fn new(mua: f64, mus: f64, g: f64, n: f64) -> Self {
        Self { mua, mus, g, n }
    }

    /// Non-absorbing, non-scattering medium with refractive index `n`.
    ///
    /// Region 0 of every media table has this form.
    pub fn ambient(n: f64) -> Self {
        Self {
            mua: 0.0,
            mus: 0.0,
            g: 1.0,
            n,
        }
    }

    /// Total attenuation μt = μa + μs.
    #[inline]
    pub fn mu_t(&self) -> f64 {
        self.mua + self.mus
    }
}

impl Default for Medium {
    fn default() -> Self {
        Self::ambient(1.0)
    }
}

/// Region assigned to an element.
///
/// `Medium(0)` is the outside/void medium. The two pending variants are
/// setup-time markers and disappear after
/// `TetMesh::classify_source_detector_elements`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Medium(usize),
    /// Candidate element for a wide-field source entry (raw label -1)
    PendingSource,
    /// Wide-field external detector element (raw label -2)
    PendingDetector,
}

impl Region {
    /// Decode a raw integer label.
    pub fn from_label(label: i64) -> Option<Self> {
        match label {
            -1 => Some(Region::PendingSource),
            -2 => Some(Region::PendingDetector),
            l if l >= 0 => Some(Region::Medium(l as usize)),
            _ => None,
        }
    }

    /// Medium index, treating pending markers as the void medium.
    #[inline]
    pub fn medium_index(&self) -> usize {
        match self {
            Region::Medium(m) => *m,
            Region::PendingSource | Region::PendingDetector => 0,
        }
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        self.medium_index() == 0
    }
}

impl Default for Region {
    fn default() -> Self {
        Region::Medium(0)
    }
}
