//! Error types for transport setup and execution.
//!
//! Every error here is fatal and is raised before the first photon is
//! launched. Per-photon anomalies are counted in `TransportStats` instead.

use lumen_mesh::MeshError;
use thiserror::Error;

/// Invalid or inconsistent simulation configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("photon count must be positive")]
    NoPhotons,

    #[error("time gates are invalid: start {start}, end {end}, step {step}")]
    InvalidTimeGates { start: f64, end: f64, step: f64 },

    #[error("{name} must be {requirement}, got {value}")]
    OutOfRange {
        name: &'static str,
        requirement: &'static str,
        value: f64,
    },

    #[error("grid step must be positive on every axis")]
    InvalidGridStep,

    #[error("grid step {step:?} gives {counts:?} voxels per axis, too many to allocate")]
    GridTooLarge { step: [f64; 3], counts: [f64; 3] },

    #[error("source provides {source_patterns} patterns but the configuration expects {configured}")]
    PatternMismatch {
        source_patterns: usize,
        configured: usize,
    },

    #[error("{0} output requires a replay plan")]
    ReplayRequired(&'static str),

    #[error("replay plan is empty")]
    EmptyReplay,

    #[error("accumulator of {gates} gates x {bins} bins x {patterns} patterns overflows")]
    AccumulatorOverflow {
        gates: usize,
        bins: usize,
        patterns: usize,
    },
}

/// Result type for configuration checks.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors while building the ray tracer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TracerError {
    #[error("mesh is incomplete: {0}")]
    IncompleteMesh(&'static str),

    #[error("element {0} has zero volume")]
    DegenerateElement(usize),

    #[error("dual grid: {0}")]
    Grid(#[from] ConfigError),
}

/// Result type for tracer construction.
pub type TracerResult<T> = Result<T, TracerError>;

/// Top-level error for a simulation run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tracer error: {0}")]
    Tracer(#[from] TracerError),

    #[error("no element encloses the source position {0:?}")]
    SourceOutsideMesh([f64; 3]),

    #[error("wide-field source does not enter the mesh")]
    SourceMissesMesh,
}

/// Result type for simulation runs.
pub type SimulationResult<T> = Result<T, SimulationError>;
