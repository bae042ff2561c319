//! Lumen Transport - Mesh-based Monte Carlo photon transport.
//!
//! Photons are launched from a source, random-walked through a
//! tetrahedral mesh one element at a time and absorbed, scattered,
//! reflected or refracted according to the optical properties of each
//! region. Absorbed weight is accumulated per node, element or voxel and
//! time gate, then normalized to fluence, flux or energy.
//!
//! Photons are independent. A run is split into chunks traced in
//! parallel with rayon; per-photon random streams are derived from the
//! run seed and the photon index, so results do not depend on thread
//! count or scheduling beyond floating-point summation order.
//!
//! # Example
//!
//! ```ignore
//! use lumen_mesh::{structured_box, Medium, Region};
//! use lumen_transport::{PencilSource, SimConfig, Simulation};
//! use lumen_math::DVec3;
//!
//! let media = vec![Medium::ambient(1.0), Medium::new(0.01, 1.0, 0.9, 1.37)];
//! let mesh = structured_box(DVec3::ZERO, DVec3::splat(60.0), [6, 6, 6], media, |_| Region::Medium(1))?;
//! let source = PencilSource::new(DVec3::new(30.0, 30.0, 0.0), DVec3::Z);
//! let sim = Simulation::new(mesh, SimConfig::default().with_photons(100_000), source)?;
//! let output = sim.run()?;
//! println!("absorbed {:?}", output.stats.absorbed_fraction());
//! ```

pub mod accumulator;
pub mod config;
pub mod detector;
pub mod error;
pub mod normalize;
pub mod optics;
pub mod photon;
pub mod replay;
pub mod scatter;
pub mod simulation;
pub mod source;
pub mod stats;
pub mod tracer;

// Re-export commonly used types
pub use accumulator::WeightAccumulator;
pub use config::{Basis, FresnelMode, OutputKind, ReffModel, SimConfig, SurfaceNormalization, TracerMethod};
pub use detector::{DetectedPhoton, DetectorImage, DetectorPlane, ExitState, PointDetector, R_C0};
pub use error::{ConfigError, SimulationError, SimulationResult, TracerError};
pub use normalize::{EnergyTotals, FieldLayout, Normalizer, ReplayTotals};
pub use photon::{photon_seed, trace_photon, PhotonTally, TrajectoryPoint, TransportContext, DELTA_MUA};
pub use replay::{ReplayEntry, ReplayPlan};
pub use simulation::{generate_chunks, PhotonChunk, Simulation, SimulationOutput, DEFAULT_CHUNK_SIZE};
pub use source::{ConeSource, Entry, IsotropicSource, Launch, LaunchSite, PencilSource, PhotonSource, PlanarSource};
pub use stats::{PhotonOutcome, Termination, TransportStats};
pub use tracer::{DualGrid, FaceExit, Preparation, RayTracer};
