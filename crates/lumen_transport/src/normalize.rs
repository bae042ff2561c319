//! Conversion of raw deposited weight into physical quantities.
//!
//! Every function works on one pattern of a `(gate, bin, pattern)` array
//! and returns the factor the field was finally multiplied by.

use lumen_mesh::TetMesh;
use serde::{Deserialize, Serialize};

use crate::config::{Basis, OutputKind, SimConfig};
use crate::photon::DELTA_MUA;
use crate::tracer::DualGrid;

/// Shape of a `(gate, bin, pattern)` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub gates: usize,
    pub bins: usize,
    pub patterns: usize,
}

impl FieldLayout {
    #[inline]
    pub fn index(&self, gate: usize, bin: usize, pattern: usize) -> usize {
        (gate * self.bins + bin) * self.patterns + pattern
    }

    /// Indices of all entries of one pattern.
    pub fn pattern_indices(&self, pattern: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.gates).flat_map(move |g| (0..self.bins).map(move |b| self.index(g, b, pattern)))
    }
}

/// Energy totals needed to normalize one pattern.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EnergyTotals {
    /// Launched energy
    pub launched: f64,
    /// Energy absorbed along the paths
    pub absorbed: f64,
}

/// Replay totals for replay-only outputs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReplayTotals {
    pub photons: usize,
    pub weight: f64,
}

fn scale_pattern(field: &mut [f64], layout: FieldLayout, pattern: usize, factor: f64) {
    for i in layout.pattern_indices(pattern) {
        field[i] *= factor;
    }
}

fn safe_inverse(value: f64, what: &str) -> f64 {
    if value > 0.0 {
        1.0 / value
    } else {
        log::warn!("Cannot normalize by {} of {}, leaving the field at zero scale", what, value);
        0.0
    }
}

/// Divide diffuse reflectance by the launched energy.
pub fn normalize_reflectance(reflectance: &mut [f64], layout: FieldLayout, pattern: usize, energy: &EnergyTotals) -> f64 {
    let factor = safe_inverse(energy.launched, "launched energy");
    scale_pattern(reflectance, layout, pattern, factor);
    factor
}

/// Mesh-side inputs of weight normalization.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    pub mesh: &'a TetMesh,
    pub config: &'a SimConfig,
    /// Dual grid of the grid method
    pub grid: Option<&'a DualGrid>,
}

impl<'a> Normalizer<'a> {
    pub fn new(mesh: &'a TetMesh, config: &'a SimConfig, grid: Option<&'a DualGrid>) -> Self {
        Self { mesh, config, grid }
    }

    /// Normalize the main weight field of one pattern.
    ///
    /// - replay outputs: Jacobian by `1 / (Δμa N)`, weighted outputs by the
    ///   total replay weight
    /// - energy: divide by the launched energy
    /// - flux and fluence: divide by bin volume, then rescale so the field
    ///   reproduces the absorbed energy (flux also divides by the gate width)
    ///
    /// Fluence comes out per mm² and flux per mm² per second.
    pub fn weights(
        &self,
        field: &mut [f64],
        layout: FieldLayout,
        pattern: usize,
        energy: &EnergyTotals,
        replay: Option<&ReplayTotals>,
    ) -> f64 {
        let (mesh, config) = (self.mesh, self.config);
        if let Some(replay) = replay {
            let factor = match config.output {
                OutputKind::Jacobian => safe_inverse(DELTA_MUA * replay.photons as f64, "replayed photons"),
                _ => safe_inverse(replay.weight, "replay weight"),
            };
            scale_pattern(field, layout, pattern, factor);
            return factor;
        }

        if config.output == OutputKind::Energy {
            let factor = safe_inverse(energy.launched, "launched energy");
            scale_pattern(field, layout, pattern, factor);
            return factor;
        }

        let unit = config.unit_in_mm;
        let mut factor = match self.grid {
            Some(grid) => safe_inverse(energy.launched * grid.voxel_volume() * unit.powi(3), "launched energy"),
            None => {
                let scale = match config.effective_basis() {
                    Basis::Node => node_fluence(field, layout, pattern, mesh, energy),
                    Basis::Element => element_fluence(field, layout, pattern, mesh, energy),
                };
                scale / (unit * unit)
            }
        };

        if config.output == OutputKind::Flux {
            factor /= config.t_step;
        }
        scale_pattern(field, layout, pattern, factor);
        factor
    }
}

/// Divide node weights by node volume and return the absorbed-energy scale.
fn node_fluence(field: &mut [f64], layout: FieldLayout, pattern: usize, mesh: &TetMesh, energy: &EnergyTotals) -> f64 {
    for gate in 0..layout.gates {
        for (node, &volume) in mesh.node_volumes.iter().enumerate().take(layout.bins) {
            if volume > 0.0 {
                field[layout.index(gate, node, pattern)] /= volume;
            }
        }
    }

    let mut deposit = 0.0;
    for e in (0..mesh.element_count()).filter(|&e| mesh.is_tissue(e)) {
        let mut sum = 0.0;
        for gate in 0..layout.gates {
            for &node in &mesh.elements[e] {
                sum += field[layout.index(gate, node, pattern)];
            }
        }
        deposit += sum * mesh.element_volumes[e] * mesh.medium(e).mua;
    }
    energy.absorbed * safe_inverse(energy.launched * deposit * 0.25, "absorbed energy")
}

/// Divide element weights by `volume × μa` and return the absorbed-energy scale.
fn element_fluence(field: &mut [f64], layout: FieldLayout, pattern: usize, mesh: &TetMesh, energy: &EnergyTotals) -> f64 {
    let deposit: f64 = layout.pattern_indices(pattern).map(|i| field[i]).sum();

    for e in 0..layout.bins.min(mesh.element_count()) {
        let absorption = mesh.element_volumes[e] * mesh.medium(e).mua;
        for gate in 0..layout.gates {
            let i = layout.index(gate, e, pattern);
            field[i] = if absorption > 0.0 { field[i] / absorption } else { 0.0 };
        }
    }
    energy.absorbed * safe_inverse(energy.launched * deposit, "absorbed energy")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_math::DVec3;
    use lumen_mesh::{structured_box, Medium, Region};

    fn cube() -> TetMesh {
        structured_box(
            DVec3::ZERO,
            DVec3::splat(2.0),
            [1, 1, 1],
            vec![Medium::ambient(1.0), Medium::new(0.5, 1.0, 0.9, 1.37)],
            |_| Region::Medium(1),
        )
        .unwrap()
    }

    #[test]
    fn test_energy_divides_by_launched() {
        let mesh = cube();
        let config = SimConfig::default().with_output(OutputKind::Energy);
        let layout = FieldLayout {
            gates: 1,
            bins: mesh.node_count(),
            patterns: 1,
        };
        let mut field = vec![2.0; layout.bins];
        let energy = EnergyTotals {
            launched: 4.0,
            absorbed: 1.0,
        };
        let factor = Normalizer::new(&mesh, &config, None).weights(&mut field, layout, 0, &energy, None);
        assert_eq!(factor, 0.25);
        assert!(field.iter().all(|v| *v == 0.5));
    }

    #[test]
    fn test_element_fluence_reproduces_absorbed_energy() {
        let mesh = cube();
        let config = SimConfig::default()
            .with_basis(Basis::Element)
            .with_output(OutputKind::Fluence);
        let layout = FieldLayout {
            gates: 1,
            bins: mesh.element_count(),
            patterns: 1,
        };
        let mut field: Vec<f64> = (0..layout.bins).map(|e| 1.0 + e as f64).collect();
        let energy = EnergyTotals {
            launched: 10.0,
            absorbed: 3.0,
        };
        Normalizer::new(&mesh, &config, None).weights(&mut field, layout, 0, &energy, None);

        // Σ μa Φ V equals the absorbed fraction
        let absorbed: f64 = (0..layout.bins)
            .map(|e| field[e] * mesh.element_volumes[e] * mesh.medium(e).mua)
            .sum();
        assert!((absorbed - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_node_fluence_reproduces_absorbed_energy() {
        let mesh = cube();
        let config = SimConfig::default().with_output(OutputKind::Fluence);
        let layout = FieldLayout {
            gates: 2,
            bins: mesh.node_count(),
            patterns: 1,
        };
        let mut field: Vec<f64> = (0..layout.gates * layout.bins).map(|i| 0.5 + i as f64).collect();
        let energy = EnergyTotals {
            launched: 8.0,
            absorbed: 2.0,
        };
        Normalizer::new(&mesh, &config, None).weights(&mut field, layout, 0, &energy, None);

        let mut absorbed = 0.0;
        for e in 0..mesh.element_count() {
            for gate in 0..layout.gates {
                let mean: f64 = mesh.elements[e].iter().map(|&n| field[layout.index(gate, n, 0)]).sum::<f64>() * 0.25;
                absorbed += mean * mesh.element_volumes[e] * mesh.medium(e).mua;
            }
        }
        assert!((absorbed - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_flux_divides_by_gate_width() {
        let mesh = cube();
        let layout = FieldLayout {
            gates: 1,
            bins: mesh.element_count(),
            patterns: 1,
        };
        let energy = EnergyTotals {
            launched: 1.0,
            absorbed: 1.0,
        };
        let base = SimConfig::default().with_basis(Basis::Element).with_time_gates(0.0, 1e-9, 1e-9);
        let mut fluence = vec![1.0; layout.bins];
        let mut flux = fluence.clone();
        let fluence_config = base.clone().with_output(OutputKind::Fluence);
        let flux_config = base.with_output(OutputKind::Flux);
        let f1 = Normalizer::new(&mesh, &fluence_config, None).weights(&mut fluence, layout, 0, &energy, None);
        let f2 = Normalizer::new(&mesh, &flux_config, None).weights(&mut flux, layout, 0, &energy, None);
        assert!((f2 * 1e-9 - f1).abs() < 1e-12 * f1.abs());
    }

    #[test]
    fn test_jacobian_replay_scale() {
        let mesh = cube();
        let config = SimConfig::default().with_output(OutputKind::Jacobian);
        let layout = FieldLayout {
            gates: 1,
            bins: mesh.node_count(),
            patterns: 1,
        };
        let mut field = vec![1.0; layout.bins];
        let replay = ReplayTotals { photons: 100, weight: 3.0 };
        let factor =
            Normalizer::new(&mesh, &config, None).weights(&mut field, layout, 0, &EnergyTotals::default(), Some(&replay));
        assert!((factor - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_launch_does_not_produce_nan() {
        let mesh = cube();
        let config = SimConfig::default().with_output(OutputKind::Energy);
        let layout = FieldLayout {
            gates: 1,
            bins: mesh.node_count(),
            patterns: 1,
        };
        let mut field = vec![1.0; layout.bins];
        Normalizer::new(&mesh, &config, None).weights(&mut field, layout, 0, &EnergyTotals::default(), None);
        assert!(field.iter().all(|v| v.is_finite()));
    }
}
