// Run a photon transport simulation on a homogeneous cube phantom.
// Usage: lumen [config.json]

use anyhow::{Context, Result};
use lumen_math::DVec3;
use lumen_mesh::{structured_box, Medium, Region, TetMesh};
use lumen_transport::{
    DetectorImage, DetectorPlane, OutputKind, PencilSource, PointDetector, SimConfig, Simulation, SimulationOutput,
    TransportStats,
};
use serde::Serialize;
use std::{env, fs};

const CUBE_SIZE: f64 = 60.0;
const CUBE_CELLS: usize = 6;

#[derive(Serialize)]
struct Summary<'a> {
    output: &'static str,
    nodes: usize,
    elements: usize,
    boundary_faces: usize,
    stats: &'a TransportStats,
    absorbed_fraction: Vec<f64>,
    energy_residual: Vec<f64>,
    normalizers: &'a [f64],
    /// Sum of the normalized field per pattern
    totals: Vec<f64>,
    detections: usize,
    detector_image: Option<ImageSummary>,
}

#[derive(Serialize)]
struct ImageSummary {
    resolution: [usize; 2],
    total: f64,
    anomalies: usize,
}

fn cube() -> Result<TetMesh> {
    let media = vec![Medium::ambient(1.0), Medium::new(0.005, 1.0, 0.01, 1.37)];
    structured_box(
        DVec3::ZERO,
        DVec3::splat(CUBE_SIZE),
        [CUBE_CELLS; 3],
        media,
        |_| Region::Medium(1),
    )
    .context("Failed to build cube phantom")
}

fn load_config(path: Option<&str>) -> Result<SimConfig> {
    let Some(path) = path else {
        return Ok(SimConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let config: SimConfig = serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path))?;
    log::info!("Loaded configuration from {}", path);
    Ok(config)
}

fn detector_image(config: &SimConfig, sim_output: &SimulationOutput, media: &[Medium]) -> Option<ImageSummary> {
    if !config.save_exit || sim_output.detections.is_empty() {
        return None;
    }
    let plane = DetectorPlane::new([0.0, 0.0], [CUBE_SIZE, CUBE_SIZE], [32, 32]);
    let mut image = DetectorImage::new(plane, config.gate_count(), config.t_step);
    image.accumulate(&sim_output.detections, media, config.unit_in_mm);
    Some(ImageSummary {
        resolution: plane.resolution,
        total: image.data.iter().sum(),
        anomalies: image.anomalies,
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = env::args().collect();
    let mut config = load_config(args.get(1).map(String::as_str))?;
    let source = PencilSource::new(DVec3::new(CUBE_SIZE * 0.5 + 0.1, CUBE_SIZE * 0.5 - 0.1, 0.0), DVec3::Z);

    let (output, sim) = if config.output.requires_replay() {
        // Forward pass with seeds, then replay the detected photons
        if config.detectors.is_empty() {
            log::warn!("No detectors configured, adding one 10 mm from the source");
            config.detectors.push(PointDetector::new(DVec3::new(CUBE_SIZE * 0.5 + 10.0, CUBE_SIZE * 0.5, 0.0), 2.0));
        }
        let forward_config = config
            .clone()
            .with_output(OutputKind::Fluence)
            .with_detections(true)
            .with_seeds(true);
        let forward = Simulation::new(cube()?, forward_config, source)?;
        let detected = forward.run()?.detections;

        let sim = Simulation::new(cube()?, config.clone(), source)?;
        let plan = sim.replay_plan(&detected);
        log::info!("Replaying {} of {} detected photons", plan.len(), detected.len());
        (sim.replay(&plan)?, sim)
    } else {
        let sim = Simulation::new(cube()?, config.clone(), source)?;
        (sim.run()?, sim)
    };

    let mesh = sim.mesh();
    let summary = Summary {
        output: config.output.name(),
        nodes: mesh.node_count(),
        elements: mesh.element_count(),
        boundary_faces: sim.preparation().boundary_faces,
        stats: &output.stats,
        absorbed_fraction: output.stats.absorbed_fraction(),
        energy_residual: output.stats.energy_residual(),
        normalizers: &output.normalizers,
        totals: (0..output.layout.patterns).map(|p| output.total(p)).collect(),
        detections: output.detections.len(),
        detector_image: detector_image(&config, &output, &mesh.media),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
