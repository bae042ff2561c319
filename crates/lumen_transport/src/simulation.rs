//! Parallel simulation driver.
//!
//! Photons are split into fixed-size chunks which rayon traces in
//! parallel. Each chunk owns a `PhotonTally`; tallies are merged in chunk
//! order after the run so detection records come out in photon order.

use std::time::Instant;

use lumen_mesh::TetMesh;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::accumulator::WeightAccumulator;
use crate::config::{Basis, SimConfig};
use crate::detector::DetectedPhoton;
use crate::error::{ConfigError, SimulationResult};
use crate::normalize::{normalize_reflectance, EnergyTotals, FieldLayout, Normalizer, ReplayTotals};
use crate::photon::{photon_seed, trace_photon, PhotonTally, TrajectoryPoint, TransportContext};
use crate::replay::{ReplayEntry, ReplayPlan};
use crate::source::{LaunchSite, PhotonSource};
use crate::stats::TransportStats;
use crate::tracer::{prepare, Preparation, RayTracer};

/// Photons traced per work item.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// A contiguous range of photons traced by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotonChunk {
    pub start: usize,
    pub count: usize,
    /// Position of this chunk in the run
    pub index: usize,
}

/// Split `total` photons into chunks of at most `chunk_size`.
pub fn generate_chunks(total: usize, chunk_size: usize) -> Vec<PhotonChunk> {
    let chunk_size = chunk_size.max(1);
    (0..total)
        .step_by(chunk_size)
        .enumerate()
        .map(|(index, start)| PhotonChunk {
            start,
            count: chunk_size.min(total - start),
            index,
        })
        .collect()
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    /// Layout of `weights`: bins are nodes, elements or voxels
    pub layout: FieldLayout,
    pub weights: Vec<f64>,
    /// Layout of `reflectance`: bins are boundary face ids
    pub reflectance_layout: FieldLayout,
    pub reflectance: Option<Vec<f64>>,
    pub detections: Vec<DetectedPhoton>,
    pub trajectory: Vec<TrajectoryPoint>,
    pub stats: TransportStats,
    /// Factor applied to `weights`, per pattern (empty without normalization)
    pub normalizers: Vec<f64>,
}

impl SimulationOutput {
    #[inline]
    pub fn value(&self, gate: usize, bin: usize, pattern: usize) -> f64 {
        self.weights[self.layout.index(gate, bin, pattern)]
    }

    /// Sum of one pattern over all gates and bins.
    pub fn total(&self, pattern: usize) -> f64 {
        self.layout.pattern_indices(pattern).map(|i| self.weights[i]).sum()
    }

    /// Time-integrated value of one bin.
    pub fn integrated(&self, bin: usize, pattern: usize) -> f64 {
        (0..self.layout.gates).map(|g| self.value(g, bin, pattern)).sum()
    }
}

/// A prepared mesh, tracer and source, ready to run.
///
/// Construction runs the one-time mesh passes in order: validation,
/// source/detector classification, volumes and winding, media scaling and
/// boundary preparation. The mesh is frozen afterwards.
#[derive(Debug)]
pub struct Simulation<S: PhotonSource> {
    mesh: TetMesh,
    config: SimConfig,
    source: S,
    tracer: RayTracer,
    preparation: Preparation,
    launch: LaunchSite,
}

impl<S: PhotonSource> Simulation<S> {
    pub fn new(mut mesh: TetMesh, config: SimConfig, source: S) -> SimulationResult<Self> {
        config.validate()?;
        if source.pattern_count() != config.pattern_count {
            return Err(ConfigError::PatternMismatch {
                source_patterns: source.pattern_count(),
                configured: config.pattern_count,
            }
            .into());
        }

        mesh.validate()?;
        mesh.classify_source_detector_elements()?;
        mesh.compute_volumes();
        mesh.scale_media(config.unit_in_mm);
        let preparation = prepare(&mut mesh, &config)?;
        let tracer = RayTracer::build(&mesh, config.method, config.grid_step)?;

        if mesh.detector_region.is_some() && !config.detectors.is_empty() {
            log::warn!(
                "Mesh has an external detector region, ignoring {} point detectors",
                config.detectors.len()
            );
        }
        if mesh.detector_region.is_some() && !config.save_detections {
            log::warn!("Mesh has an external detector region but detection records are off");
        }

        let launch = LaunchSite::resolve(&mesh, &source)?;

        Ok(Self {
            mesh,
            config,
            source,
            tracer,
            preparation,
            launch,
        })
    }

    /// The prepared mesh. Media coefficients are in inverse mesh units.
    pub fn mesh(&self) -> &TetMesh {
        &self.mesh
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn tracer(&self) -> &RayTracer {
        &self.tracer
    }

    pub fn preparation(&self) -> &Preparation {
        &self.preparation
    }

    pub fn launch_site(&self) -> &LaunchSite {
        &self.launch
    }

    /// Trace `config.photons` photons.
    pub fn run(&self) -> SimulationResult<SimulationOutput> {
        if self.config.output.requires_replay() {
            return Err(ConfigError::ReplayRequired(self.config.output.name()).into());
        }
        let seed = self.config.seed;
        self.execute(self.config.photons, None, |i| (i, photon_seed(seed, i), None))
    }

    /// Re-trace the photons of a replay plan from their seeds.
    pub fn replay(&self, plan: &ReplayPlan) -> SimulationResult<SimulationOutput> {
        if plan.is_empty() {
            return Err(ConfigError::EmptyReplay.into());
        }
        let totals = ReplayTotals {
            photons: plan.len(),
            weight: plan.total_weight(),
        };
        self.execute(plan.len(), Some(totals), |i| {
            let entry = plan.entries[i];
            (entry.photon, entry.seed, Some(entry))
        })
    }

    /// Replay plan for the records of `config.replay_detector` (all
    /// detectors when unset), weighted with this mesh's media.
    pub fn replay_plan(&self, detections: &[DetectedPhoton]) -> ReplayPlan {
        ReplayPlan::from_detections(
            detections,
            &self.mesh.media,
            self.config.unit_in_mm,
            self.config.replay_detector,
        )
    }

    fn bin_count(&self) -> usize {
        match self.tracer.grid() {
            Some(grid) => grid.voxel_count(),
            None => match self.config.effective_basis() {
                Basis::Node => self.mesh.node_count(),
                Basis::Element => self.mesh.element_count(),
            },
        }
    }

    fn execute<F>(&self, count: usize, replay: Option<ReplayTotals>, job: F) -> SimulationResult<SimulationOutput>
    where
        F: Fn(usize) -> (usize, u64, Option<ReplayEntry>) + Sync,
    {
        let config = &self.config;
        let gates = config.gate_count();
        let patterns = config.pattern_count;
        let layout = FieldLayout {
            gates,
            bins: self.bin_count(),
            patterns,
        };
        let reflectance_layout = FieldLayout {
            gates,
            bins: self.preparation.boundary_faces,
            patterns,
        };

        let weights = WeightAccumulator::new(gates, layout.bins, patterns)?;
        let reflectance = if config.save_reflectance {
            Some(WeightAccumulator::new(gates, reflectance_layout.bins, patterns)?)
        } else {
            None
        };

        let ctx = TransportContext {
            mesh: &self.mesh,
            tracer: &self.tracer,
            config,
            source: &self.source,
            launch: &self.launch,
            weights: &weights,
            reflectance: reflectance.as_ref(),
        };

        let start_time = Instant::now();
        let chunks = generate_chunks(count, DEFAULT_CHUNK_SIZE);
        let tallies: Vec<PhotonTally> = chunks
            .par_iter()
            .map(|chunk| {
                let mut tally = PhotonTally::new(patterns);
                for i in chunk.start..chunk.start + chunk.count {
                    let (index, seed, entry) = job(i);
                    trace_photon(&ctx, index, seed, entry.as_ref(), &mut tally);
                }
                tally
            })
            .collect();

        let mut stats = TransportStats::new(patterns);
        let mut detections = Vec::new();
        let mut trajectory = Vec::new();
        for tally in tallies {
            stats.merge(&tally.stats);
            detections.extend(tally.detections);
            trajectory.extend(tally.trajectory);
        }
        if detections.len() > config.max_detections {
            stats.dropped_detections += detections.len() - config.max_detections;
            detections.truncate(config.max_detections);
        }
        trajectory.truncate(config.max_trajectory_points);

        log::info!(
            "Traced {} photons in {:.2?}: {} exited, {} captured, {} detected, {} stuck",
            stats.launched,
            start_time.elapsed(),
            stats.exited,
            stats.captured,
            stats.detected,
            stats.stuck
        );
        if stats.stuck > 0 {
            log::warn!("{} photons got stuck and were dropped", stats.stuck);
        }
        if stats.dropped_detections > 0 {
            log::warn!("Dropped {} detection records over the limit", stats.dropped_detections);
        }

        let mut weights = weights.into_vec();
        let mut reflectance = reflectance.map(WeightAccumulator::into_vec);
        let mut normalizers = Vec::new();

        if config.normalize {
            let replay = replay.filter(|_| config.output.requires_replay());
            let normalizer = Normalizer::new(&self.mesh, config, self.tracer.grid());
            for pattern in 0..patterns {
                let energy = EnergyTotals {
                    launched: stats.energy_launched[pattern],
                    absorbed: stats.energy_absorbed[pattern],
                };
                normalizers.push(normalizer.weights(&mut weights, layout, pattern, &energy, replay.as_ref()));
                if let Some(reflectance) = reflectance.as_mut() {
                    normalize_reflectance(reflectance, reflectance_layout, pattern, &energy);
                }
            }
            log::debug!("Normalized {} output with factors {:?}", config.output.name(), normalizers);
        }

        Ok(SimulationOutput {
            layout,
            weights,
            reflectance_layout,
            reflectance,
            detections,
            trajectory,
            stats,
            normalizers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputKind;
    use crate::error::SimulationError;
    use crate::source::PencilSource;
    use lumen_math::DVec3;
    use lumen_mesh::{structured_box, Medium, Region};

    fn cube() -> TetMesh {
        structured_box(
            DVec3::ZERO,
            DVec3::splat(4.0),
            [2, 2, 2],
            vec![Medium::ambient(1.0), Medium::new(0.05, 1.0, 0.9, 1.37)],
            |_| Region::Medium(1),
        )
        .unwrap()
    }

    fn pencil() -> PencilSource {
        PencilSource::new(DVec3::new(1.7, 2.2, 0.0), DVec3::Z)
    }

    #[test]
    fn test_chunks_cover_range() {
        let chunks = generate_chunks(1000, 256);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3].start, 768);
        assert_eq!(chunks[3].count, 232);
        assert_eq!(chunks.iter().map(|c| c.count).sum::<usize>(), 1000);
        assert!(generate_chunks(0, 256).is_empty());
    }

    #[test]
    fn test_replay_output_requires_plan() {
        let config = SimConfig::default().with_output(OutputKind::Jacobian);
        let sim = Simulation::new(cube(), config, pencil()).unwrap();
        assert!(matches!(
            sim.run(),
            Err(SimulationError::Config(ConfigError::ReplayRequired(_)))
        ));
        assert!(matches!(
            sim.replay(&ReplayPlan::default()),
            Err(SimulationError::Config(ConfigError::EmptyReplay))
        ));
    }

    #[test]
    fn test_pattern_count_must_match_source() {
        let config = SimConfig::default().with_pattern_count(2);
        assert!(matches!(
            Simulation::new(cube(), config, pencil()),
            Err(SimulationError::Config(ConfigError::PatternMismatch { .. }))
        ));
    }

    #[test]
    fn test_run_is_reproducible() {
        let config = SimConfig::default()
            .with_photons(300)
            .with_output(OutputKind::Energy)
            .with_detections(true)
            .with_detector(crate::detector::PointDetector::new(DVec3::new(2.0, 2.0, 0.0), 1.5));
        let sim = Simulation::new(cube(), config, pencil()).unwrap();
        let a = sim.run().unwrap();
        let b = sim.run().unwrap();

        assert_eq!(a.stats.launched, 300);
        assert_eq!(a.detections, b.detections);
        assert_eq!(a.stats.energy_absorbed, b.stats.energy_absorbed);
        for (x, y) in a.weights.iter().zip(&b.weights) {
            assert!((x - y).abs() <= 1e-12 * x.abs().max(1.0));
        }
    }
}
