//! Simulation configuration.
//!
//! `SimConfig` is a plain value with public fields, sensible defaults and
//! `with_*` builder methods. Hosts can also deserialize it from JSON. Once
//! handed to `Simulation::new` it is validated and never changes.

use lumen_math::DVec3;
use serde::{Deserialize, Serialize};

use crate::detector::PointDetector;
use crate::error::{ConfigError, ConfigResult};

/// Whether weights live on nodes or on elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Basis {
    /// Piecewise constant, one bin per element
    Element,
    /// Piecewise linear, one bin per node
    Node,
}

/// Physical quantity produced by normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    /// Fluence rate, 1/(mm² s)
    Flux,
    /// Time-integrated fluence, 1/mm²
    Fluence,
    /// Absorbed energy fraction
    Energy,
    /// Replay: absorption Jacobian
    Jacobian,
    /// Replay: detected-weight-weighted path length
    WeightedLength,
    /// Replay: detected-weight-weighted scattering count
    WeightedScatter,
}

impl OutputKind {
    /// Replay-only outputs.
    pub fn requires_replay(&self) -> bool {
        matches!(
            self,
            OutputKind::Jacobian | OutputKind::WeightedLength | OutputKind::WeightedScatter
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputKind::Flux => "flux",
            OutputKind::Fluence => "fluence",
            OutputKind::Energy => "energy",
            OutputKind::Jacobian => "jacobian",
            OutputKind::WeightedLength => "weighted length",
            OutputKind::WeightedScatter => "weighted scatter",
        }
    }
}

/// Face-crossing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TracerMethod {
    Plucker,
    Havel,
    Badouel,
    /// Badouel with output on a regular voxel grid
    BadouelGrid,
}

/// How partial reflection at the external boundary is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FresnelMode {
    /// Reflect with probability R, otherwise transmit the full weight
    Stochastic,
    /// Transmit weight × (1 - R) and keep tracing the reflected remainder
    Deterministic,
}

/// How the effective reflectance of a tissue/ambient boundary is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReffModel {
    /// Numerical angle integration of the Fresnel reflectance
    Quadrature,
    /// Polynomial fit in `n_in / n_out`, fine for indices near 1.4
    Fit,
}

/// Surface node volume correction used by node-basis normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceNormalization {
    Off,
    /// Scale boundary node volumes by 2 / (1 + Reff). Exact only for flat
    /// surfaces; edge and corner nodes remain biased.
    Approximate,
}

/// Full set of run parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of photons to launch (ignored in replay)
    pub photons: usize,
    /// Run seed; photon `i` derives its own stream from it
    pub seed: u64,
    /// Time gate start, seconds
    pub t_start: f64,
    /// Time gate end, seconds; photons are dropped once they reach it
    pub t_end: f64,
    /// Time gate width, seconds
    pub t_step: f64,
    /// Weight below which Russian roulette starts
    pub min_weight: f64,
    /// Roulette survival is 1 / roulette_size
    pub roulette_size: f64,
    pub basis: Basis,
    pub output: OutputKind,
    pub method: TracerMethod,
    /// Voxel size for `TracerMethod::BadouelGrid`, mesh units
    pub grid_step: DVec3,
    /// Apply Fresnel reflection at refractive-index mismatches
    pub reflect: bool,
    pub fresnel: FresnelMode,
    /// Lose the specular reflection `R` of the entry face when a photon
    /// enters the mesh from outside
    pub specular: bool,
    pub surface_normalization: SurfaceNormalization,
    pub reff_model: ReffModel,
    /// Accumulate diffuse reflectance per boundary face
    pub save_reflectance: bool,
    /// Keep detection records
    pub save_detections: bool,
    /// Store each detected photon's seed for replay
    pub save_seeds: bool,
    /// Track momentum transfer per region
    pub save_momentum: bool,
    /// Store exit position and direction of detected photons
    pub save_exit: bool,
    pub detectors: Vec<PointDetector>,
    /// Detection records beyond this count are dropped
    pub max_detections: usize,
    /// Record a trace of scattering positions
    pub record_trajectory: bool,
    pub max_trajectory_points: usize,
    /// Mesh length unit in millimeters
    pub unit_in_mm: f64,
    /// Convert raw weights into the selected output quantity
    pub normalize: bool,
    /// Number of illumination patterns of the source
    pub pattern_count: usize,
    /// Replay only photons of this detector (all when `None`)
    pub replay_detector: Option<usize>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            photons: 10_000,
            seed: 1_648_335_518,
            t_start: 0.0,
            t_end: 5e-9,
            t_step: 5e-9,
            min_weight: 1e-6,
            roulette_size: 10.0,
            basis: Basis::Node,
            output: OutputKind::Flux,
            method: TracerMethod::Plucker,
            grid_step: DVec3::ONE,
            reflect: true,
            fresnel: FresnelMode::Stochastic,
            specular: false,
            surface_normalization: SurfaceNormalization::Approximate,
            reff_model: ReffModel::Quadrature,
            save_reflectance: false,
            save_detections: false,
            save_seeds: false,
            save_momentum: false,
            save_exit: false,
            detectors: Vec::new(),
            max_detections: 1_000_000,
            record_trajectory: false,
            max_trajectory_points: 100_000,
            unit_in_mm: 1.0,
            normalize: true,
            pattern_count: 1,
            replay_detector: None,
        }
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_photons(mut self, photons: usize) -> Self {
        self.photons = photons;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the time gates (seconds).
    pub fn with_time_gates(mut self, start: f64, end: f64, step: f64) -> Self {
        self.t_start = start;
        self.t_end = end;
        self.t_step = step;
        self
    }

    /// Set roulette threshold and survival factor.
    pub fn with_roulette(mut self, min_weight: f64, roulette_size: f64) -> Self {
        self.min_weight = min_weight;
        self.roulette_size = roulette_size;
        self
    }

    pub fn with_basis(mut self, basis: Basis) -> Self {
        self.basis = basis;
        self
    }

    pub fn with_output(mut self, output: OutputKind) -> Self {
        self.output = output;
        self
    }

    pub fn with_method(mut self, method: TracerMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_grid_step(mut self, step: DVec3) -> Self {
        self.grid_step = step;
        self
    }

    pub fn with_reflect(mut self, reflect: bool) -> Self {
        self.reflect = reflect;
        self
    }

    pub fn with_fresnel(mut self, mode: FresnelMode) -> Self {
        self.fresnel = mode;
        self
    }

    pub fn with_specular(mut self, specular: bool) -> Self {
        self.specular = specular;
        self
    }

    pub fn with_surface_normalization(mut self, mode: SurfaceNormalization) -> Self {
        self.surface_normalization = mode;
        self
    }

    pub fn with_reff_model(mut self, model: ReffModel) -> Self {
        self.reff_model = model;
        self
    }

    pub fn with_reflectance(mut self, save: bool) -> Self {
        self.save_reflectance = save;
        self
    }

    /// Add a point detector and turn on detection records.
    pub fn with_detector(mut self, detector: PointDetector) -> Self {
        self.detectors.push(detector);
        self.save_detections = true;
        self
    }

    pub fn with_detections(mut self, save: bool) -> Self {
        self.save_detections = save;
        self
    }

    pub fn with_seeds(mut self, save: bool) -> Self {
        self.save_seeds = save;
        self
    }

    pub fn with_momentum(mut self, save: bool) -> Self {
        self.save_momentum = save;
        self
    }

    pub fn with_exit(mut self, save: bool) -> Self {
        self.save_exit = save;
        self
    }

    pub fn with_trajectory(mut self, max_points: usize) -> Self {
        self.record_trajectory = true;
        self.max_trajectory_points = max_points;
        self
    }

    pub fn with_unit_in_mm(mut self, unit: f64) -> Self {
        self.unit_in_mm = unit;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_pattern_count(mut self, count: usize) -> Self {
        self.pattern_count = count;
        self
    }

    pub fn with_replay_detector(mut self, detector: Option<usize>) -> Self {
        self.replay_detector = detector;
        self
    }

    /// Number of time gates, rounded to the nearest whole gate.
    pub fn gate_count(&self) -> usize {
        (((self.t_end - self.t_start) / self.t_step).round() as usize).max(1)
    }

    /// Gate index of time `t`, clamped to the last gate.
    #[inline]
    pub fn gate_of(&self, t: f64) -> usize {
        let gate = ((t - self.t_start) / self.t_step).floor();
        if gate <= 0.0 {
            0
        } else {
            (gate as usize).min(self.gate_count() - 1)
        }
    }

    /// Basis used for accumulation; the grid method always bins per voxel.
    pub fn effective_basis(&self) -> Basis {
        if self.method == TracerMethod::BadouelGrid {
            Basis::Element
        } else {
            self.basis
        }
    }

    /// Check every field for a legal value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.photons == 0 {
            return Err(ConfigError::NoPhotons);
        }
        let gates_ok = self.t_step > 0.0 && self.t_end > self.t_start && self.t_step.is_finite();
        if !gates_ok {
            return Err(ConfigError::InvalidTimeGates {
                start: self.t_start,
                end: self.t_end,
                step: self.t_step,
            });
        }
        if !(self.min_weight >= 0.0) {
            return Err(ConfigError::OutOfRange {
                name: "min_weight",
                requirement: "non-negative",
                value: self.min_weight,
            });
        }
        if !(self.roulette_size >= 1.0) {
            return Err(ConfigError::OutOfRange {
                name: "roulette_size",
                requirement: "at least 1",
                value: self.roulette_size,
            });
        }
        if !(self.unit_in_mm > 0.0) {
            return Err(ConfigError::OutOfRange {
                name: "unit_in_mm",
                requirement: "positive",
                value: self.unit_in_mm,
            });
        }
        if self.pattern_count == 0 {
            return Err(ConfigError::OutOfRange {
                name: "pattern_count",
                requirement: "at least 1",
                value: 0.0,
            });
        }
        if self.method == TracerMethod::BadouelGrid && !(self.grid_step.min_element() > 0.0) {
            return Err(ConfigError::InvalidGridStep);
        }
        for det in &self.detectors {
            if !(det.radius > 0.0) {
                return Err(ConfigError::OutOfRange {
                    name: "detector radius",
                    requirement: "positive",
                    value: det.radius,
                });
            }
        }
        Ok(())
    }
}
