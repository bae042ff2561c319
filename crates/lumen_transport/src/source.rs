//! Photon launch sources.
//!
//! A source samples a launch position and direction. Point-like sources
//! start inside the mesh at a fixed position, so the enclosing element is
//! found once. Wide-field sources start on a plane outside the mesh and
//! every photon searches for its entry face.

use lumen_math::{DVec3, Interval, Ray};
use lumen_mesh::TetMesh;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{SimulationError, SimulationResult};
use crate::scatter::rotate_direction;

/// A sampled launch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Launch {
    pub position: DVec3,
    pub direction: DVec3,
}

/// Where a launched photon starts inside the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub element: usize,
    pub position: DVec3,
    /// Exposed face of `element` the photon enters through from outside
    pub face: Option<usize>,
}

/// Tolerance on the barycentric weight for a fixed position on a face.
const ON_FACE: f64 = 1e-9;

/// Pluggable launch sampler.
pub trait PhotonSource: Send + Sync {
    /// Sample a launch. `pattern_weights` arrives filled with 1.0 and
    /// pattern sources overwrite it with per-pattern weights.
    fn sample(&self, rng: &mut dyn RngCore, pattern_weights: &mut [f64]) -> Launch;

    /// Fixed launch position of point-like sources.
    fn fixed_position(&self) -> Option<DVec3> {
        None
    }

    /// Number of illumination patterns.
    fn pattern_count(&self) -> usize {
        1
    }
}

impl<T: PhotonSource + ?Sized> PhotonSource for Box<T> {
    fn sample(&self, rng: &mut dyn RngCore, pattern_weights: &mut [f64]) -> Launch {
        (**self).sample(rng, pattern_weights)
    }

    fn fixed_position(&self) -> Option<DVec3> {
        (**self).fixed_position()
    }

    fn pattern_count(&self) -> usize {
        (**self).pattern_count()
    }
}

/// Where launched photons enter the mesh.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchSite {
    /// Point-like source inside a known element
    Fixed(usize),
    /// Wide-field source entering through one of these `(element, face)`
    /// exposed faces
    Surface(Vec<(usize, usize)>),
}

impl LaunchSite {
    /// Resolve the launch site of `source` on a prepared mesh.
    ///
    /// A fixed position must lie in a non-void element. Wide-field sources
    /// enter through the exposed faces of the source candidate elements,
    /// or through every exposed face when the mesh marks none.
    pub fn resolve(mesh: &TetMesh, source: &dyn PhotonSource) -> SimulationResult<Self> {
        if let Some(position) = source.fixed_position() {
            let (element, _) = mesh
                .locate_enclosing_element(position)
                .ok_or(SimulationError::SourceOutsideMesh(position.to_array()))?;
            log::debug!("Source at {:?} lies in element {}", position, element);
            return Ok(LaunchSite::Fixed(element));
        }

        let exposed = |e: usize| {
            (0..4)
                .filter(move |&face| mesh.adjacency[e][face].is_exposed())
                .map(move |face| (e, face))
        };
        let mut faces: Vec<(usize, usize)> = mesh.source_elements.iter().flat_map(|&e| exposed(e)).collect();
        if faces.is_empty() {
            faces = (0..mesh.element_count()).flat_map(exposed).collect();
        }
        if faces.is_empty() {
            return Err(SimulationError::SourceMissesMesh);
        }
        log::debug!("Wide-field source has {} candidate entry faces", faces.len());
        Ok(LaunchSite::Surface(faces))
    }

    /// Element and position where a launch starts inside the mesh.
    ///
    /// Surface launches take the nearest entry face hit along the launch
    /// direction; `None` means the photon misses the mesh. A fixed launch
    /// sitting on an exposed face and pointing inward also reports that
    /// face as its entry face.
    pub fn enter(&self, mesh: &TetMesh, launch: &Launch) -> Option<Entry> {
        let inward = |e: usize, face: usize| mesh.face_normal(e, face).dot(launch.direction) < 0.0;
        match self {
            LaunchSite::Fixed(element) => {
                let bary = mesh.signed_barycentric(*element, launch.position);
                let face = (0..4).find(|&f| {
                    mesh.adjacency[*element][f].is_exposed() && bary[f].abs() < ON_FACE && inward(*element, f)
                });
                Some(Entry {
                    element: *element,
                    position: launch.position,
                    face,
                })
            }
            LaunchSite::Surface(faces) => {
                let ray = Ray::new(launch.position, launch.direction);
                let forward = Interval::FORWARD;
                faces
                    .iter()
                    .filter(|&&(e, face)| inward(e, face))
                    .filter_map(|&(e, face)| {
                        let [a, b, c] = mesh.face_vertices(e, face);
                        ray.hit_triangle(a, b, c, forward).map(|t| (e, face, t))
                    })
                    .min_by(|x, y| x.2.total_cmp(&y.2))
                    .map(|(element, face, t)| Entry {
                        element,
                        position: ray.at(t),
                        face: Some(face),
                    })
            }
        }
    }
}

/// Collimated beam from a single point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PencilSource {
    pub position: DVec3,
    pub direction: DVec3,
}

impl PencilSource {
    pub fn new(position: DVec3, direction: DVec3) -> Self {
        Self {
            position,
            direction: direction.normalize(),
        }
    }
}

impl PhotonSource for PencilSource {
    fn sample(&self, _rng: &mut dyn RngCore, _pattern_weights: &mut [f64]) -> Launch {
        Launch {
            position: self.position,
            direction: self.direction,
        }
    }

    fn fixed_position(&self) -> Option<DVec3> {
        Some(self.position)
    }
}

/// Uniform emission over the full sphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsotropicSource {
    pub position: DVec3,
}

impl IsotropicSource {
    pub fn new(position: DVec3) -> Self {
        Self { position }
    }
}

impl PhotonSource for IsotropicSource {
    fn sample(&self, rng: &mut dyn RngCore, _pattern_weights: &mut [f64]) -> Launch {
        let cos_theta = 2.0 * rng.gen::<f64>() - 1.0;
        let phi = std::f64::consts::TAU * rng.gen::<f64>();
        Launch {
            position: self.position,
            direction: rotate_direction(DVec3::Z, cos_theta, phi),
        }
    }

    fn fixed_position(&self) -> Option<DVec3> {
        Some(self.position)
    }
}

/// Uniform emission into a cone of half-angle `half_angle` (radians).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConeSource {
    pub position: DVec3,
    pub axis: DVec3,
    pub half_angle: f64,
}

impl ConeSource {
    pub fn new(position: DVec3, axis: DVec3, half_angle: f64) -> Self {
        Self {
            position,
            axis: axis.normalize(),
            half_angle,
        }
    }
}

impl PhotonSource for ConeSource {
    fn sample(&self, rng: &mut dyn RngCore, _pattern_weights: &mut [f64]) -> Launch {
        let cos_max = self.half_angle.cos();
        let cos_theta = 1.0 - rng.gen::<f64>() * (1.0 - cos_max);
        let phi = std::f64::consts::TAU * rng.gen::<f64>();
        Launch {
            position: self.position,
            direction: rotate_direction(self.axis, cos_theta, phi).normalize(),
        }
    }

    fn fixed_position(&self) -> Option<DVec3> {
        Some(self.position)
    }
}

/// Wide-field collimated source over a parallelogram.
///
/// The launch area spans `origin + s·edge_u + t·edge_v` for `s, t` in
/// `[0, 1)`. With patterns, the area is split into `resolution` pixels and
/// every pattern assigns one weight per pixel (row-major, u fastest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanarSource {
    pub origin: DVec3,
    pub edge_u: DVec3,
    pub edge_v: DVec3,
    pub direction: DVec3,
    /// Pattern pixel counts along u and v
    pub resolution: [usize; 2],
    /// One weight image per pattern
    pub patterns: Vec<Vec<f64>>,
}

impl PlanarSource {
    /// Uniform planar source (a single all-ones pattern).
    pub fn new(origin: DVec3, edge_u: DVec3, edge_v: DVec3, direction: DVec3) -> Self {
        Self {
            origin,
            edge_u,
            edge_v,
            direction: direction.normalize(),
            resolution: [1, 1],
            patterns: vec![vec![1.0]],
        }
    }

    /// Attach illumination patterns, `resolution[0] * resolution[1]` weights each.
    pub fn with_patterns(mut self, resolution: [usize; 2], patterns: Vec<Vec<f64>>) -> Self {
        self.resolution = resolution;
        self.patterns = patterns;
        self
    }

    /// Pixel index of the launch parameters `(s, t)`.
    pub fn pixel(&self, s: f64, t: f64) -> usize {
        let [nu, nv] = self.resolution;
        let i = ((s * nu as f64) as usize).min(nu.saturating_sub(1));
        let j = ((t * nv as f64) as usize).min(nv.saturating_sub(1));
        j * nu + i
    }
}

impl PhotonSource for PlanarSource {
    fn sample(&self, rng: &mut dyn RngCore, pattern_weights: &mut [f64]) -> Launch {
        let s: f64 = rng.gen();
        let t: f64 = rng.gen();
        let pixel = self.pixel(s, t);
        for (w, pattern) in pattern_weights.iter_mut().zip(&self.patterns) {
            *w = pattern.get(pixel).copied().unwrap_or(0.0);
        }
        Launch {
            position: self.origin + self.edge_u * s + self.edge_v * t,
            direction: self.direction,
        }
    }

    fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use lumen_mesh::{structured_box, Medium, Region};

    fn cube() -> TetMesh {
        let mut mesh = structured_box(
            DVec3::ZERO,
            DVec3::splat(2.0),
            [2, 2, 2],
            vec![Medium::ambient(1.0), Medium::new(0.01, 1.0, 0.9, 1.37)],
            |_| Region::Medium(1),
        )
        .unwrap();
        crate::tracer::number_boundary_faces(&mut mesh);
        mesh
    }

    #[test]
    fn test_fixed_site_requires_enclosing_element() {
        let mesh = cube();
        let inside = PencilSource::new(DVec3::new(0.5, 0.7, 0.3), DVec3::Z);
        let site = LaunchSite::resolve(&mesh, &inside).unwrap();
        let LaunchSite::Fixed(e) = site else {
            panic!("expected a fixed site");
        };
        assert!(mesh.barycentric(e, inside.position).is_some());

        let outside = PencilSource::new(DVec3::splat(5.0), DVec3::Z);
        assert!(matches!(
            LaunchSite::resolve(&mesh, &outside),
            Err(SimulationError::SourceOutsideMesh(_))
        ));
    }

    #[test]
    fn test_fixed_site_in_void_layer_is_outside() {
        let mesh = structured_box(
            DVec3::ZERO,
            DVec3::splat(2.0),
            [2, 2, 2],
            vec![Medium::ambient(1.0), Medium::new(0.01, 1.0, 0.9, 1.37)],
            |c| if c.z < 1.0 { Region::Medium(0) } else { Region::Medium(1) },
        )
        .unwrap();
        let in_void = PencilSource::new(DVec3::new(0.5, 0.7, 0.3), DVec3::Z);
        assert!(matches!(
            LaunchSite::resolve(&mesh, &in_void),
            Err(SimulationError::SourceOutsideMesh(_))
        ));

        // On the interface the tissue element wins
        let on_interface = PencilSource::new(DVec3::new(0.5, 0.7, 1.0), DVec3::Z);
        let LaunchSite::Fixed(e) = LaunchSite::resolve(&mesh, &on_interface).unwrap() else {
            panic!("expected a fixed site");
        };
        assert_eq!(mesh.regions[e], Region::Medium(1));
    }

    #[test]
    fn test_surface_entry_hits_top_face() {
        let mesh = cube();
        let source = PlanarSource::new(DVec3::new(0.2, 0.2, 3.0), DVec3::X * 1.5, DVec3::Y * 1.5, -DVec3::Z);
        let site = LaunchSite::resolve(&mesh, &source).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut weights = [1.0];
        for _ in 0..50 {
            let launch = source.sample(&mut rng, &mut weights);
            let entry = site.enter(&mesh, &launch).unwrap();
            assert!((entry.position.z - 2.0).abs() < 1e-12);
            assert!(mesh
                .signed_barycentric(entry.element, entry.position)
                .iter()
                .all(|w| *w > -1e-9));
            let face = entry.face.unwrap();
            assert!(mesh.adjacency[entry.element][face].is_exposed());
            assert!(mesh.face_normal(entry.element, face).z > 0.0);
        }

        let away = Launch {
            position: DVec3::new(1.0, 1.0, 3.0),
            direction: DVec3::Z,
        };
        assert!(site.enter(&mesh, &away).is_none());
    }

    #[test]
    fn test_fixed_entry_face_only_on_surface() {
        let mesh = cube();
        let mut rng = StdRng::seed_from_u64(1);
        let mut weights = [1.0];

        let on_surface = PencilSource::new(DVec3::new(0.7, 1.2, 0.0), DVec3::Z);
        let site = LaunchSite::resolve(&mesh, &on_surface).unwrap();
        let entry = site.enter(&mesh, &on_surface.sample(&mut rng, &mut weights)).unwrap();
        let face = entry.face.unwrap();
        assert!(mesh.face_normal(entry.element, face).z < 0.0);

        let inside = PencilSource::new(DVec3::new(0.7, 1.2, 0.6), DVec3::Z);
        let site = LaunchSite::resolve(&mesh, &inside).unwrap();
        let entry = site.enter(&mesh, &inside.sample(&mut rng, &mut weights)).unwrap();
        assert!(entry.face.is_none());
    }

    #[test]
    fn test_cone_stays_within_half_angle() {
        let source = ConeSource::new(DVec3::ZERO, DVec3::new(1.0, 1.0, 0.0), 0.3);
        let mut rng = StdRng::seed_from_u64(42);
        let mut weights = [1.0];
        for _ in 0..1000 {
            let launch = source.sample(&mut rng, &mut weights);
            assert!(launch.direction.dot(source.axis) >= 0.3f64.cos() - 1e-12);
        }
    }

    #[test]
    fn test_isotropic_mean_direction_near_zero() {
        let source = IsotropicSource::new(DVec3::ZERO);
        let mut rng = StdRng::seed_from_u64(42);
        let mut weights = [1.0];
        let n = 50_000;
        let mean = (0..n).map(|_| source.sample(&mut rng, &mut weights).direction).sum::<DVec3>() / n as f64;
        assert!(mean.length() < 0.02);
    }

    #[test]
    fn test_pattern_weights_follow_pixel() {
        let source = PlanarSource::new(DVec3::ZERO, DVec3::X * 2.0, DVec3::Y * 2.0, DVec3::Z)
            .with_patterns([2, 1], vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut weights = [1.0, 1.0];
        for _ in 0..100 {
            let launch = source.sample(&mut rng, &mut weights);
            if launch.position.x < 1.0 {
                assert_eq!(weights, [1.0, 0.0]);
            } else {
                assert_eq!(weights, [0.0, 1.0]);
            }
        }
        assert_eq!(source.pattern_count(), 2);
        assert!(source.fixed_position().is_none());
    }
}
