//! Per-photon random walk.
//!
//! A photon lives entirely on the stack of the worker tracing it. Each
//! step asks the tracer where the ray leaves the current element and
//! compares that distance with the remaining free path `slen / μt`:
//!
//! - **Scatter first**: move, deposit, sample a Henyey-Greenstein direction
//!   and a new free path, then apply Russian roulette
//! - **Face first**: move to the face, deposit, then pass into the
//!   neighbor, reflect or refract at an index mismatch, leave the mesh or
//!   get captured by the external detector region
//!
//! With `SimConfig::specular`, a photon entering through an exposed face
//! first loses the Fresnel reflectance of that face.
//!
//! The only shared writes are atomic adds into the weight and reflectance
//! accumulators. Detection records, trajectory points and statistics go
//! to the worker's `PhotonTally`.

use lumen_math::{DVec3, Ray};
use lumen_mesh::{Adjacency, Medium, TetMesh};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::accumulator::WeightAccumulator;
use crate::config::{Basis, FresnelMode, OutputKind, SimConfig};
use crate::detector::{find_detector, DetectedPhoton, ExitState, R_C0};
use crate::optics::{reflect, refract, Fresnel};
use crate::replay::ReplayEntry;
use crate::scatter::{sample_scattering_length, scatter_direction};
use crate::source::{Entry, LaunchSite, PhotonSource};
use crate::stats::{PhotonOutcome, Termination, TransportStats};
use crate::tracer::{FaceExit, RayTracer};

/// Absorption perturbation used by the replay Jacobian, 1/mm.
pub const DELTA_MUA: f64 = 1e-4;

/// Consecutive zero-length face crossings before a photon counts as stuck.
const MAX_ZERO_STEPS: u32 = 64;

/// Derive the seed of photon `index` from the run seed (SplitMix64).
pub fn photon_seed(run_seed: u64, index: usize) -> u64 {
    let mut z = run_seed.wrapping_add((index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// A recorded position along a photon path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub photon: usize,
    pub position: DVec3,
    pub weight: f64,
}

/// Read-only inputs and shared accumulators of a run.
pub struct TransportContext<'a> {
    pub mesh: &'a TetMesh,
    pub tracer: &'a RayTracer,
    pub config: &'a SimConfig,
    pub source: &'a dyn PhotonSource,
    pub launch: &'a LaunchSite,
    pub weights: &'a WeightAccumulator,
    pub reflectance: Option<&'a WeightAccumulator>,
}

/// Per-worker output buffers.
#[derive(Debug, Clone, Default)]
pub struct PhotonTally {
    pub detections: Vec<DetectedPhoton>,
    pub trajectory: Vec<TrajectoryPoint>,
    pub stats: TransportStats,
}

impl PhotonTally {
    pub fn new(patterns: usize) -> Self {
        Self {
            detections: Vec::new(),
            trajectory: Vec::new(),
            stats: TransportStats::new(patterns),
        }
    }
}

/// Trace one photon history from launch to termination.
///
/// The photon's random stream is seeded with `seed`. With `replay` set,
/// the walk is identical to the original run and replay quantities are
/// deposited instead of absorbed weight.
pub fn trace_photon(
    ctx: &TransportContext<'_>,
    index: usize,
    seed: u64,
    replay: Option<&ReplayEntry>,
    tally: &mut PhotonTally,
) -> PhotonOutcome {
    let mut walker = Walker::launch(ctx, index, seed, replay);
    let termination = match walker.start {
        Some(entry) => {
            walker.element = entry.element;
            walker.position = entry.position;
            if let Some(face) = entry.face.filter(|_| ctx.config.specular) {
                walker.enter_through(face);
            }
            walker.record_point(tally);
            walker.run(tally)
        }
        None => {
            walker.escaped = walker.weight;
            walker.weight = 0.0;
            Termination::Missed
        }
    };

    let outcome = PhotonOutcome {
        termination,
        launch_weight: walker.launch_weight,
        absorbed: walker.absorbed,
        escaped: walker.escaped,
        specular: walker.specular,
        remaining: walker.weight,
        roulette_gain: walker.roulette_gain,
        time: walker.time,
        scatter_events: walker.scatter_events,
        detections: walker.detections,
    };
    if termination == Termination::Stuck {
        log::debug!("Photon {} stuck in element {}", index, walker.element);
    }
    tally.stats.record(&outcome, &walker.pattern_weights);
    outcome
}

struct Walker<'a, 'c> {
    ctx: &'c TransportContext<'a>,
    rng: StdRng,
    index: usize,
    seed: u64,
    replay: Option<ReplayEntry>,
    start: Option<Entry>,

    element: usize,
    position: DVec3,
    direction: DVec3,
    weight: f64,
    launch_weight: f64,
    /// Product of roulette and partial-transmission factors
    scale: f64,
    time: f64,
    /// Remaining dimensionless free path
    slen: f64,
    pattern_weights: Vec<f64>,
    partial_path: Vec<f64>,
    /// Path length through void elements inside the mesh
    void_path: f64,
    scatter_counts: Vec<u32>,
    momentum: Vec<f64>,

    absorbed: f64,
    escaped: f64,
    specular: f64,
    /// Weight added by roulette survivors
    roulette_gain: f64,
    scatter_events: u64,
    detections: usize,
}

impl<'a, 'c> Walker<'a, 'c> {
    fn launch(ctx: &'c TransportContext<'a>, index: usize, seed: u64, replay: Option<&ReplayEntry>) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pattern_weights = vec![1.0; ctx.config.pattern_count];
        let launch = ctx.source.sample(&mut rng, &mut pattern_weights);
        let start = ctx.launch.enter(ctx.mesh, &launch);
        let slen = sample_scattering_length(&mut rng);
        let regions = ctx.mesh.tissue_media_end();

        Self {
            ctx,
            rng,
            index,
            seed,
            replay: replay.copied(),
            start,
            element: 0,
            position: launch.position,
            direction: launch.direction,
            weight: 1.0,
            launch_weight: 1.0,
            scale: 1.0,
            time: 0.0,
            slen,
            pattern_weights,
            partial_path: vec![0.0; regions],
            void_path: 0.0,
            scatter_counts: vec![0; regions],
            momentum: vec![0.0; regions],
            absorbed: 0.0,
            escaped: 0.0,
            specular: 0.0,
            roulette_gain: 0.0,
            scatter_events: 0,
            detections: 0,
        }
    }

    /// Specular loss at the exposed entry face of the launch element.
    ///
    /// Weight `R` is reflected back out; the direction is kept.
    fn enter_through(&mut self, face: usize) {
        let mesh = self.ctx.mesh;
        let n_out = mesh.media[0].n;
        let n_in = mesh.medium(self.element).n;
        if n_in == n_out {
            return;
        }
        let normal = self.ctx.tracer.normal(self.element, face);
        let fresnel = Fresnel::new(n_out, n_in, self.direction.dot(normal));
        let lost = self.weight * fresnel.reflectance;
        self.specular += lost;
        self.weight -= lost;
        self.scale *= 1.0 - fresnel.reflectance;
    }

    fn run(&mut self, tally: &mut PhotonTally) -> Termination {
        let t_end = self.ctx.config.t_end;
        let mut zero_steps = 0u32;

        loop {
            let medium = *self.ctx.mesh.medium(self.element);
            let ray = Ray::new(self.position, self.direction);
            let Some(exit) = self.ctx.tracer.exit(self.ctx.mesh, self.element, &ray) else {
                return Termination::Stuck;
            };

            let mu_t = medium.mu_t();
            let free_path = if mu_t > 0.0 { self.slen / mu_t } else { f64::INFINITY };

            if free_path < exit.distance {
                let end = ray.at(free_path);
                self.deposit(&medium, end, free_path);
                self.position = end;
                self.slen = sample_scattering_length(&mut self.rng);
                if self.time >= t_end {
                    return Termination::TimeLimit;
                }
                self.scatter(&medium, tally);
                zero_steps = 0;
                if let Some(done) = self.roulette() {
                    return done;
                }
                continue;
            }

            self.deposit(&medium, exit.point, exit.distance);
            self.position = exit.point;
            self.slen = (self.slen - exit.distance * mu_t).max(0.0);
            if self.time >= t_end {
                return Termination::TimeLimit;
            }

            if exit.distance > 0.0 {
                zero_steps = 0;
            } else {
                zero_steps += 1;
                if zero_steps > MAX_ZERO_STEPS {
                    return Termination::Stuck;
                }
            }

            if let Some(done) = self.cross(&medium, &exit, tally) {
                return done;
            }
        }
    }

    /// Move along a straight segment inside the current element.
    fn deposit(&mut self, medium: &Medium, end: DVec3, length: f64) {
        let config = self.ctx.config;
        let unit = config.unit_in_mm;
        let start = self.position;
        let tissue = self.ctx.mesh.is_tissue(self.element);

        let delta = if medium.mua > 0.0 {
            self.weight * (1.0 - (-medium.mua * length).exp())
        } else {
            0.0
        };

        if tissue {
            match self.replay.filter(|_| config.output.requires_replay()) {
                Some(replay) => {
                    let value = match config.output {
                        OutputKind::Jacobian => replay.weight * (1.0 - (-DELTA_MUA * length * unit).exp()),
                        OutputKind::WeightedLength => replay.weight * length * unit,
                        _ => 0.0,
                    };
                    if value > 0.0 {
                        self.spread(config.gate_of(replay.time), start, end, value);
                    }
                }
                None => {
                    let gate = config.gate_of(self.time);
                    if self.ctx.tracer.grid().is_some() {
                        self.deposit_voxels(gate, medium, start, length);
                    } else if delta > 0.0 {
                        self.spread(gate, start, end, delta);
                    }
                }
            }
        }

        self.weight -= delta;
        self.absorbed += delta;
        self.time += length * unit * medium.n * R_C0;

        let region = self.ctx.mesh.regions[self.element].medium_index();
        if tissue && region < self.partial_path.len() {
            self.partial_path[region] += length;
        } else if region == 0 {
            self.void_path += length;
        }
    }

    /// Split `value` over the bins of the segment `start..end`.
    fn spread(&self, gate: usize, start: DVec3, end: DVec3, value: f64) {
        let weights = self.ctx.weights;
        if let Some(grid) = self.ctx.tracer.grid() {
            weights.add_patterns(gate, grid.voxel_index((start + end) * 0.5), value, &self.pattern_weights);
            return;
        }
        match self.ctx.config.basis {
            Basis::Element => weights.add_patterns(gate, self.element, value, &self.pattern_weights),
            Basis::Node => {
                let mesh = self.ctx.mesh;
                let b0 = mesh.signed_barycentric(self.element, start);
                let b1 = mesh.signed_barycentric(self.element, end);
                for (k, &node) in mesh.elements[self.element].iter().enumerate() {
                    let share = 0.5 * (b0[k] + b1[k]);
                    weights.add_patterns(gate, node, value * share, &self.pattern_weights);
                }
            }
        }
    }

    /// Track-length deposit on the dual grid, sub-sampled at half a voxel.
    fn deposit_voxels(&self, gate: usize, medium: &Medium, start: DVec3, length: f64) {
        let Some(grid) = self.ctx.tracer.grid() else {
            return;
        };
        let config = self.ctx.config;
        let pieces = (length / (0.5 * grid.min_step())).ceil().max(1.0) as usize;
        let piece = length / pieces as f64;
        let mut w = self.weight;

        for i in 0..pieces {
            let mid = start + self.direction * (piece * (i as f64 + 0.5));
            let dw = w * (1.0 - (-medium.mua * piece).exp());
            let value = match config.output {
                OutputKind::Energy => dw,
                _ if medium.mua > 0.0 => dw / medium.mua * config.unit_in_mm,
                _ => w * piece * config.unit_in_mm,
            };
            w -= dw;
            if value > 0.0 {
                self.ctx
                    .weights
                    .add_patterns(gate, grid.voxel_index(mid), value, &self.pattern_weights);
            }
        }
    }

    fn scatter(&mut self, medium: &Medium, tally: &mut PhotonTally) {
        let (direction, cos_theta) = scatter_direction(medium.g, self.direction, &mut self.rng);
        self.direction = direction;
        self.scatter_events += 1;

        let region = self.ctx.mesh.regions[self.element].medium_index();
        if region < self.scatter_counts.len() {
            self.scatter_counts[region] += 1;
            self.momentum[region] += 1.0 - cos_theta;
        }

        if let Some(replay) = self.replay {
            if self.ctx.config.output == OutputKind::WeightedScatter && self.ctx.mesh.is_tissue(self.element) {
                let gate = self.ctx.config.gate_of(replay.time);
                self.spread(gate, self.position, self.position, replay.weight);
            }
        }
        self.record_point(tally);
    }

    fn roulette(&mut self) -> Option<Termination> {
        let config = self.ctx.config;
        if self.weight <= 0.0 {
            return Some(Termination::Roulette);
        }
        if self.weight >= config.min_weight {
            return None;
        }
        if self.rng.gen::<f64>() * config.roulette_size <= 1.0 {
            self.roulette_gain += self.weight * (config.roulette_size - 1.0);
            self.weight *= config.roulette_size;
            self.scale *= config.roulette_size;
            None
        } else {
            Some(Termination::Roulette)
        }
    }

    /// Resolve a face crossing at `exit`.
    fn cross(&mut self, medium: &Medium, exit: &FaceExit, tally: &mut PhotonTally) -> Option<Termination> {
        let mesh = self.ctx.mesh;
        match mesh.adjacency[self.element][exit.face] {
            Adjacency::Neighbor(next) => {
                let next_region = mesh.regions[next].medium_index();
                if mesh.detector_region == Some(next_region) {
                    return Some(self.capture(tally));
                }
                if next_region == 0 && !mesh.regions[self.element].is_void() {
                    return self.leave(medium, exit, None, tally);
                }

                let n_out = mesh.media[next_region].n;
                if self.ctx.config.reflect && medium.n != n_out {
                    let normal = self.ctx.tracer.normal(self.element, exit.face);
                    let fresnel = Fresnel::new(medium.n, n_out, self.direction.dot(normal));
                    if fresnel.is_total() || self.rng.gen::<f64>() < fresnel.reflectance {
                        self.direction = reflect(self.direction, normal);
                        return None;
                    }
                    self.direction = refract(self.direction, normal, medium.n / n_out, fresnel.cos_t);
                }
                self.element = next;
                None
            }
            Adjacency::Open => self.leave(medium, exit, None, tally),
            Adjacency::Boundary(id) => self.leave(medium, exit, Some(id), tally),
        }
    }

    /// Handle a photon reaching the outside of the mesh.
    fn leave(
        &mut self,
        medium: &Medium,
        exit: &FaceExit,
        boundary: Option<usize>,
        tally: &mut PhotonTally,
    ) -> Option<Termination> {
        if self.ctx.mesh.regions[self.element].is_void() {
            self.escaped += self.weight;
            self.weight = 0.0;
            return Some(Termination::Exited);
        }

        let config = self.ctx.config;
        let n_out = self.ctx.mesh.media[0].n;
        let normal = self.ctx.tracer.normal(self.element, exit.face);
        let mut out_direction = self.direction;

        if config.reflect && medium.n != n_out {
            let fresnel = Fresnel::new(medium.n, n_out, self.direction.dot(normal));
            if fresnel.is_total() {
                self.direction = reflect(self.direction, normal);
                return None;
            }
            out_direction = refract(self.direction, normal, medium.n / n_out, fresnel.cos_t);
            match config.fresnel {
                FresnelMode::Stochastic => {
                    if self.rng.gen::<f64>() < fresnel.reflectance {
                        self.direction = reflect(self.direction, normal);
                        return None;
                    }
                }
                FresnelMode::Deterministic => {
                    let transmit = 1.0 - fresnel.reflectance;
                    let transmitted = self.weight * transmit;
                    self.record_exit(out_direction, transmitted, transmit, boundary, tally);
                    self.weight -= transmitted;
                    self.scale *= fresnel.reflectance;
                    self.direction = reflect(self.direction, normal);
                    return self.roulette();
                }
            }
        }

        let weight = self.weight;
        self.record_exit(out_direction, weight, 1.0, boundary, tally);
        self.weight = 0.0;
        Some(Termination::Exited)
    }

    /// Book weight leaving through an external face.
    fn record_exit(
        &mut self,
        out_direction: DVec3,
        weight: f64,
        factor: f64,
        boundary: Option<usize>,
        tally: &mut PhotonTally,
    ) {
        self.escaped += weight;
        if let (Some(reflectance), Some(id)) = (self.ctx.reflectance, boundary) {
            let gate = self.ctx.config.gate_of(self.time);
            reflectance.add_patterns(gate, id, weight, &self.pattern_weights);
        }
        let config = self.ctx.config;
        if config.save_detections && self.ctx.mesh.detector_region.is_none() {
            if let Some(det) = find_detector(&config.detectors, self.position) {
                self.record_detection(det + 1, out_direction, factor, tally);
            }
        }
        if config.record_trajectory && tally.trajectory.len() < config.max_trajectory_points {
            tally.trajectory.push(TrajectoryPoint {
                photon: self.index,
                position: self.position,
                weight,
            });
        }
    }

    fn capture(&mut self, tally: &mut PhotonTally) -> Termination {
        self.escaped += self.weight;
        if self.ctx.config.save_detections {
            self.record_detection(0, self.direction, 1.0, tally);
        }
        self.record_point(tally);
        self.weight = 0.0;
        Termination::Captured
    }

    fn record_detection(&mut self, detector: usize, out_direction: DVec3, factor: f64, tally: &mut PhotonTally) {
        self.detections += 1;
        let config = self.ctx.config;
        if tally.detections.len() >= config.max_detections {
            tally.stats.dropped_detections += 1;
            return;
        }
        tally.detections.push(DetectedPhoton {
            detector,
            photon: self.index,
            scatter_counts: self.scatter_counts.clone(),
            partial_path: self.partial_path.clone(),
            void_path: self.void_path,
            momentum: config.save_momentum.then(|| self.momentum.clone()),
            exit: config.save_exit.then_some(ExitState {
                position: self.position,
                direction: out_direction,
            }),
            launch_weight: self.launch_weight * self.scale * factor,
            seed: config.save_seeds.then_some(self.seed),
        });
    }

    fn record_point(&self, tally: &mut PhotonTally) {
        let config = self.ctx.config;
        if config.record_trajectory && tally.trajectory.len() < config.max_trajectory_points {
            tally.trajectory.push(TrajectoryPoint {
                photon: self.index,
                position: self.position,
                weight: self.weight,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TracerMethod;
    use crate::detector::PointDetector;
    use crate::source::{PencilSource, PlanarSource};
    use crate::tracer::number_boundary_faces;
    use lumen_mesh::{structured_box, Region};

    fn media() -> Vec<Medium> {
        vec![Medium::ambient(1.0), Medium::new(0.05, 2.0, 0.8, 1.37)]
    }

    struct Fixture<S: PhotonSource = PencilSource> {
        mesh: TetMesh,
        tracer: RayTracer,
        config: SimConfig,
        source: S,
        launch: LaunchSite,
        weights: WeightAccumulator,
    }

    impl Fixture {
        fn new(config: SimConfig) -> Self {
            let mesh =
                structured_box(DVec3::ZERO, DVec3::splat(4.0), [3, 3, 3], media(), |_| Region::Medium(1)).unwrap();
            let source = PencilSource::new(DVec3::new(1.9, 2.1, 0.0), DVec3::Z);
            Fixture::with_mesh(mesh, source, config)
        }
    }

    impl<S: PhotonSource> Fixture<S> {
        fn with_mesh(mut mesh: TetMesh, source: S, config: SimConfig) -> Self {
            mesh.classify_source_detector_elements().unwrap();
            number_boundary_faces(&mut mesh);
            let tracer = RayTracer::build(&mesh, config.method, config.grid_step).unwrap();
            let launch = LaunchSite::resolve(&mesh, &source).unwrap();
            let weights = WeightAccumulator::new(config.gate_count(), mesh.node_count(), 1).unwrap();
            Self {
                mesh,
                tracer,
                config,
                source,
                launch,
                weights,
            }
        }

        fn context(&self) -> TransportContext<'_> {
            TransportContext {
                mesh: &self.mesh,
                tracer: &self.tracer,
                config: &self.config,
                source: &self.source,
                launch: &self.launch,
                weights: &self.weights,
                reflectance: None,
            }
        }
    }

    fn conserving_config() -> SimConfig {
        SimConfig::default()
            .with_roulette(0.0, 10.0)
            .with_reflect(false)
            .with_time_gates(0.0, 1.0, 1.0)
    }

    #[test]
    fn test_weight_is_conserved_per_photon() {
        let fixture = Fixture::new(conserving_config());
        let ctx = fixture.context();
        let mut tally = PhotonTally::new(1);

        for i in 0..200 {
            let outcome = trace_photon(&ctx, i, photon_seed(5, i), None, &mut tally);
            assert_eq!(outcome.termination, Termination::Exited);
            let total = outcome.absorbed + outcome.escaped + outcome.remaining;
            assert!((total - 1.0).abs() < 1e-12, "photon {} balance {}", i, total);
        }
        let deposited = fixture.weights.total(0);
        assert!((deposited - tally.stats.energy_absorbed[0]).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_history() {
        let fixture = Fixture::new(conserving_config().with_detections(true));
        let ctx = fixture.context();
        let mut a = PhotonTally::new(1);
        let mut b = PhotonTally::new(1);

        for i in 0..20 {
            let first = trace_photon(&ctx, i, photon_seed(9, i), None, &mut a);
            let second = trace_photon(&ctx, i, photon_seed(9, i), None, &mut b);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_deterministic_fresnel_conserves_weight() {
        let config = conserving_config()
            .with_time_gates(0.0, 1e-10, 1e-10)
            .with_reflect(true)
            .with_fresnel(FresnelMode::Deterministic)
            .with_method(TracerMethod::Havel);
        let fixture = Fixture::new(config);
        let ctx = fixture.context();
        let mut tally = PhotonTally::new(1);

        for i in 0..50 {
            let outcome = trace_photon(&ctx, i, photon_seed(1, i), None, &mut tally);
            let total = outcome.absorbed + outcome.escaped + outcome.remaining;
            assert!((total - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_short_time_window_stops_photons() {
        let fixture = Fixture::new(conserving_config().with_time_gates(0.0, 1e-14, 1e-14));
        let ctx = fixture.context();
        let mut tally = PhotonTally::new(1);
        let outcome = trace_photon(&ctx, 0, photon_seed(2, 0), None, &mut tally);
        assert_eq!(outcome.termination, Termination::TimeLimit);
        assert!(outcome.remaining > 0.0);
    }

    #[test]
    fn test_roulette_gain_closes_the_balance() {
        let config = conserving_config().with_roulette(0.5, 10.0);
        let fixture = Fixture::new(config);
        let ctx = fixture.context();
        let mut tally = PhotonTally::new(1);

        let mut gained = 0.0;
        for i in 0..200 {
            let outcome = trace_photon(&ctx, i, photon_seed(8, i), None, &mut tally);
            let total = outcome.absorbed + outcome.escaped + outcome.remaining - outcome.roulette_gain;
            assert!((total - 1.0).abs() < 1e-10, "photon {} balance {}", i, total);
            gained += outcome.roulette_gain;
        }
        assert!(gained > 0.0);
        assert!(tally.stats.energy_residual()[0].abs() < 1e-10);
    }

    #[test]
    fn test_specular_entry_scales_launch() {
        let fixture = Fixture::new(conserving_config().with_specular(true));
        let ctx = fixture.context();
        let mut tally = PhotonTally::new(1);
        let r = ((1.37f64 - 1.0) / 2.37).powi(2);

        for i in 0..20 {
            let outcome = trace_photon(&ctx, i, photon_seed(4, i), None, &mut tally);
            assert!((outcome.specular - r).abs() < 1e-12);
            assert_eq!(outcome.launch_weight, 1.0);
            let total = outcome.absorbed + outcome.escaped + outcome.specular + outcome.remaining;
            assert!((total - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_detected_time_includes_void_layer() {
        // Source layer z < 1 turns void; photons cross it before the tissue
        let mesh = structured_box(DVec3::ZERO, DVec3::new(4.0, 4.0, 5.0), [4, 4, 5], media(), |c| {
            if c.z < 1.0 {
                Region::PendingSource
            } else {
                Region::Medium(1)
            }
        })
        .unwrap();
        let source = PlanarSource::new(DVec3::new(1.0, 1.0, -1.0), DVec3::X * 2.0, DVec3::Y * 2.0, DVec3::Z);
        let config = conserving_config().with_detector(PointDetector::new(DVec3::new(2.0, 2.0, 1.0), 1.5));
        let fixture = Fixture::with_mesh(mesh, source, config);
        let ctx = fixture.context();
        let mut tally = PhotonTally::new(1);

        let mut detected = 0;
        for i in 0..300 {
            let before = tally.detections.len();
            let outcome = trace_photon(&ctx, i, photon_seed(6, i), None, &mut tally);
            if tally.detections.len() == before {
                continue;
            }
            detected += 1;
            let photon = &tally.detections[before];
            assert!((photon.void_path - 1.0).abs() < 1e-9);
            let time = photon.time(&fixture.mesh.media, 1.0);
            assert!((time - outcome.time).abs() < 1e-9 * outcome.time);
        }
        assert!(detected > 0);
    }

    #[test]
    fn test_photon_seeds_differ() {
        assert_ne!(photon_seed(1, 0), photon_seed(1, 1));
        assert_ne!(photon_seed(1, 0), photon_seed(2, 0));
        assert_eq!(photon_seed(3, 17), photon_seed(3, 17));
    }
}
