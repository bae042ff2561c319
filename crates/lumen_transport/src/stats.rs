//! Run statistics gathered by the workers.

use serde::{Deserialize, Serialize};

/// Why a photon stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Left the mesh through an external face
    Exited,
    /// Entered the external detector region
    Captured,
    /// Lost at Russian roulette
    Roulette,
    /// Reached the end of the last time gate
    TimeLimit,
    /// No exit face could be found
    Stuck,
    /// Wide-field launch missed the mesh
    Missed,
}

/// Weight bookkeeping of one photon history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhotonOutcome {
    pub termination: Termination,
    pub launch_weight: f64,
    /// Weight absorbed along the path
    pub absorbed: f64,
    /// Weight that left the mesh or entered the detector region
    pub escaped: f64,
    /// Weight reflected at the entry face
    pub specular: f64,
    /// Weight still carried at termination
    pub remaining: f64,
    /// Weight created by roulette survivors
    pub roulette_gain: f64,
    /// Time of flight at termination, seconds
    pub time: f64,
    pub scatter_events: u64,
    /// Detection records emitted
    pub detections: usize,
}

/// Counters and energy totals of a run.
///
/// Energies are per illumination pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportStats {
    pub launched: usize,
    pub exited: usize,
    pub captured: usize,
    pub roulette_killed: usize,
    pub time_limited: usize,
    pub stuck: usize,
    pub missed: usize,
    pub detected: usize,
    pub dropped_detections: usize,
    pub scatter_events: u64,
    pub energy_launched: Vec<f64>,
    pub energy_absorbed: Vec<f64>,
    pub energy_escaped: Vec<f64>,
    /// Specular reflection at entry, not part of `energy_escaped`
    pub energy_specular: Vec<f64>,
    /// Weight left when a photon stopped without exiting, including
    /// roulette losses
    pub energy_remaining: Vec<f64>,
    pub energy_roulette_gain: Vec<f64>,
}

impl TransportStats {
    pub fn new(patterns: usize) -> Self {
        Self {
            energy_launched: vec![0.0; patterns],
            energy_absorbed: vec![0.0; patterns],
            energy_escaped: vec![0.0; patterns],
            energy_specular: vec![0.0; patterns],
            energy_remaining: vec![0.0; patterns],
            energy_roulette_gain: vec![0.0; patterns],
            ..Default::default()
        }
    }

    /// Add one finished photon.
    pub fn record(&mut self, outcome: &PhotonOutcome, pattern_weights: &[f64]) {
        self.launched += 1;
        self.scatter_events += outcome.scatter_events;
        self.detected += outcome.detections;
        match outcome.termination {
            Termination::Exited => self.exited += 1,
            Termination::Captured => self.captured += 1,
            Termination::Roulette => self.roulette_killed += 1,
            Termination::TimeLimit => self.time_limited += 1,
            Termination::Stuck => self.stuck += 1,
            Termination::Missed => self.missed += 1,
        }
        for (p, w) in pattern_weights.iter().enumerate() {
            self.energy_launched[p] += outcome.launch_weight * w;
            self.energy_absorbed[p] += outcome.absorbed * w;
            self.energy_escaped[p] += outcome.escaped * w;
            self.energy_specular[p] += outcome.specular * w;
            self.energy_remaining[p] += outcome.remaining * w;
            self.energy_roulette_gain[p] += outcome.roulette_gain * w;
        }
    }

    /// Fold the statistics of another worker into this one.
    pub fn merge(&mut self, other: &TransportStats) {
        self.launched += other.launched;
        self.exited += other.exited;
        self.captured += other.captured;
        self.roulette_killed += other.roulette_killed;
        self.time_limited += other.time_limited;
        self.stuck += other.stuck;
        self.missed += other.missed;
        self.detected += other.detected;
        self.dropped_detections += other.dropped_detections;
        self.scatter_events += other.scatter_events;
        for (dst, src) in [
            (&mut self.energy_launched, &other.energy_launched),
            (&mut self.energy_absorbed, &other.energy_absorbed),
            (&mut self.energy_escaped, &other.energy_escaped),
            (&mut self.energy_specular, &other.energy_specular),
            (&mut self.energy_remaining, &other.energy_remaining),
            (&mut self.energy_roulette_gain, &other.energy_roulette_gain),
        ] {
            if dst.len() < src.len() {
                dst.resize(src.len(), 0.0);
            }
            for (d, s) in dst.iter_mut().zip(src) {
                *d += s;
            }
        }
    }

    /// Relative energy imbalance per pattern.
    ///
    /// Launched plus roulette-created weight must equal absorbed, escaped,
    /// specular and remaining weight; this returns the relative difference.
    pub fn energy_residual(&self) -> Vec<f64> {
        (0..self.energy_launched.len())
            .map(|p| {
                let source = self.energy_launched[p] + self.energy_roulette_gain[p];
                let sink = self.energy_absorbed[p]
                    + self.energy_escaped[p]
                    + self.energy_specular[p]
                    + self.energy_remaining[p];
                if source > 0.0 {
                    (sink - source) / source
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Fraction of launched energy absorbed, per pattern.
    pub fn absorbed_fraction(&self) -> Vec<f64> {
        self.energy_absorbed
            .iter()
            .zip(&self.energy_launched)
            .map(|(a, l)| if *l > 0.0 { a / l } else { 0.0 })
            .collect()
    }
}
