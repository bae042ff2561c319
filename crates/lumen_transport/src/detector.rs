//! Detectors, detection records and detector-plane images.

use lumen_math::DVec3;
use lumen_mesh::Medium;
use serde::{Deserialize, Serialize};

/// Inverse speed of light in vacuum, seconds per millimeter.
pub const R_C0: f64 = 3.335640951981520e-12;

/// Spherical point detector on the mesh surface.
///
/// An exiting photon is detected when its exit point lies within `radius`
/// of `position`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointDetector {
    pub position: DVec3,
    pub radius: f64,
}

impl PointDetector {
    pub fn new(position: DVec3, radius: f64) -> Self {
        Self { position, radius }
    }

    #[inline]
    pub fn contains(&self, point: DVec3) -> bool {
        point.distance_squared(self.position) <= self.radius * self.radius
    }
}

/// Index of the first point detector containing `point`.
pub fn find_detector(detectors: &[PointDetector], point: DVec3) -> Option<usize> {
    detectors.iter().position(|d| d.contains(point))
}

/// Exit state of a detected photon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitState {
    pub position: DVec3,
    pub direction: DVec3,
}

/// Record of one detected photon.
///
/// Per-region arrays are indexed by medium index and have one entry per
/// tissue medium (entry 0, the ambient medium, stays zero). Path lengths
/// are in mesh units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPhoton {
    /// 0 for capture by the external detector region, `i + 1` for point
    /// detector `i`
    pub detector: usize,
    /// Index of the photon in its run
    pub photon: usize,
    pub scatter_counts: Vec<u32>,
    pub partial_path: Vec<f64>,
    /// Path length through void elements inside the mesh, mesh units
    #[serde(default)]
    pub void_path: f64,
    /// Momentum transfer `Σ (1 - cos θ)` per region
    pub momentum: Option<Vec<f64>>,
    pub exit: Option<ExitState>,
    /// Weight at launch
    pub launch_weight: f64,
    /// Seed of the photon's random stream, for replay
    pub seed: Option<u64>,
}

impl DetectedPhoton {
    /// Detected weight recomputed from the partial paths.
    ///
    /// `media` must be the media table the photon was traced with, with
    /// coefficients in inverse mesh units. Changing `mua` here gives the
    /// detected weight for other absorption values without re-simulation.
    pub fn weight(&self, media: &[Medium]) -> f64 {
        let attenuation: f64 = self
            .partial_path
            .iter()
            .zip(media)
            .map(|(len, medium)| medium.mua * len)
            .sum();
        self.launch_weight * (-attenuation).exp()
    }

    /// Time of flight in seconds, void transit included.
    pub fn time(&self, media: &[Medium], unit_in_mm: f64) -> f64 {
        let tissue: f64 = self.partial_path.iter().zip(media).map(|(len, medium)| medium.n * len).sum();
        let void = media.first().map_or(0.0, |ambient| ambient.n * self.void_path);
        (tissue + void) * unit_in_mm * R_C0
    }

    /// Total path length inside tissue, mesh units.
    pub fn total_path(&self) -> f64 {
        self.partial_path.iter().sum()
    }
}

/// Rectangular pixel grid on the z-plane of a wide-field detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorPlane {
    /// Lower x/y corner
    pub origin: [f64; 2],
    /// Size along x and y
    pub extent: [f64; 2],
    /// Pixel counts along x and y
    pub resolution: [usize; 2],
}

impl DetectorPlane {
    pub fn new(origin: [f64; 2], extent: [f64; 2], resolution: [usize; 2]) -> Self {
        Self {
            origin,
            extent,
            resolution,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.resolution[0] * self.resolution[1]
    }

    /// Row-major pixel index (x fastest) of a point, if it falls on the plane.
    pub fn pixel(&self, point: DVec3) -> Option<usize> {
        let [nx, ny] = self.resolution;
        let fx = (point.x - self.origin[0]) / self.extent[0] * nx as f64;
        let fy = (point.y - self.origin[1]) / self.extent[1] * ny as f64;
        if !(fx >= 0.0 && fy >= 0.0) {
            return None;
        }
        let (ix, iy) = (fx as usize, fy as usize);
        (ix < nx && iy < ny).then_some(iy * nx + ix)
    }
}

/// Weight of a detection pattern at the photon's exit point.
///
/// Returns `None` when the record has no exit position or the exit lies
/// outside the plane.
pub fn detector_pattern_weight(plane: &DetectorPlane, pattern: &[f64], photon: &DetectedPhoton) -> Option<f64> {
    let exit = photon.exit?;
    let pixel = plane.pixel(exit.position)?;
    pattern.get(pixel).copied()
}

/// Time-resolved image of detected weight over a detector plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorImage {
    pub plane: DetectorPlane,
    pub gates: usize,
    pub t_step: f64,
    /// `gates × pixels`, gate-major
    pub data: Vec<f64>,
    /// Photons without an exit position or outside the plane
    pub anomalies: usize,
}

impl DetectorImage {
    pub fn new(plane: DetectorPlane, gates: usize, t_step: f64) -> Self {
        let gates = gates.max(1);
        Self {
            plane,
            gates,
            t_step,
            data: vec![0.0; gates * plane.pixel_count()],
            anomalies: 0,
        }
    }

    /// Bin detected photons by exit pixel and time of flight.
    pub fn accumulate(&mut self, detections: &[DetectedPhoton], media: &[Medium], unit_in_mm: f64) {
        let pixels = self.plane.pixel_count();
        for photon in detections {
            let Some(pixel) = photon.exit.and_then(|exit| self.plane.pixel(exit.position)) else {
                self.anomalies += 1;
                continue;
            };
            let gate = ((photon.time(media, unit_in_mm) / self.t_step) as usize).min(self.gates - 1);
            self.data[gate * pixels + pixel] += photon.weight(media);
        }
        if self.anomalies > 0 {
            log::debug!("{} detected photons fell outside the detector plane", self.anomalies);
        }
    }

    /// Pixel values of one gate.
    pub fn gate(&self, gate: usize) -> &[f64] {
        let pixels = self.plane.pixel_count();
        &self.data[gate * pixels..(gate + 1) * pixels]
    }
}
