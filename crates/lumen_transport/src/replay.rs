//! Seed replay of detected photons.
//!
//! A replay re-launches detected photons from their stored seeds. Each
//! replayed photon follows exactly the path it took in the original run
//! and deposits replay quantities (Jacobian, weighted path length or
//! weighted scatter count) scaled by its detected weight.

use lumen_mesh::Medium;
use serde::{Deserialize, Serialize};

use crate::detector::{detector_pattern_weight, DetectedPhoton, DetectorPlane};

/// One photon to replay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayEntry {
    /// Index of the photon in the original run
    pub photon: usize,
    pub seed: u64,
    /// Detected weight
    pub weight: f64,
    /// Time of flight at detection, seconds
    pub time: f64,
}

/// Ordered list of photons to replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayPlan {
    pub entries: Vec<ReplayEntry>,
}

impl ReplayPlan {
    /// Build a plan from detection records.
    ///
    /// Keeps records of `detector` (all when `None`) that carry a seed.
    /// `media` is the media table the photons were traced with.
    pub fn from_detections(
        detections: &[DetectedPhoton],
        media: &[Medium],
        unit_in_mm: f64,
        detector: Option<usize>,
    ) -> Self {
        Self::build(detections, media, unit_in_mm, detector, |_| Some(1.0))
    }

    /// Like `from_detections`, with each detected weight multiplied by a
    /// wide-field detection pattern sampled at the exit position.
    ///
    /// Photons without an exit position or outside the plane are skipped.
    pub fn with_detector_pattern(
        detections: &[DetectedPhoton],
        media: &[Medium],
        unit_in_mm: f64,
        detector: Option<usize>,
        plane: &DetectorPlane,
        pattern: &[f64],
    ) -> Self {
        Self::build(detections, media, unit_in_mm, detector, |photon| {
            detector_pattern_weight(plane, pattern, photon)
        })
    }

    fn build(
        detections: &[DetectedPhoton],
        media: &[Medium],
        unit_in_mm: f64,
        detector: Option<usize>,
        pattern: impl Fn(&DetectedPhoton) -> Option<f64>,
    ) -> Self {
        let mut unseeded = 0usize;
        let mut off_pattern = 0usize;
        let mut entries = Vec::new();

        for photon in detections {
            if detector.is_some_and(|d| d != photon.detector) {
                continue;
            }
            let Some(seed) = photon.seed else {
                unseeded += 1;
                continue;
            };
            let Some(scale) = pattern(photon) else {
                off_pattern += 1;
                continue;
            };
            entries.push(ReplayEntry {
                photon: photon.photon,
                seed,
                weight: scale * photon.weight(media),
                time: photon.time(media, unit_in_mm),
            });
        }

        if unseeded > 0 {
            log::warn!("{} detection records have no seed and cannot be replayed", unseeded);
        }
        if off_pattern > 0 {
            log::debug!("{} detection records fall outside the detection pattern", off_pattern);
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of detected weights, the normalizer of weighted outputs.
    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }
}
