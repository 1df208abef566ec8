//! Procedural globe terrain: fractal Brownian motion over simplex noise,
//! sampled on the unit sphere so there are no seams at the antimeridian.

use glam::DVec3;
use nebula_quadtree::Cartographic;
use noise::{NoiseFn, Simplex};

/// Unit vector pointing at `position` from the globe centre.
pub fn unit_vector(position: &Cartographic) -> DVec3 {
    let (sin_lat, cos_lat) = position.latitude.sin_cos();
    let (sin_lon, cos_lon) = position.longitude.sin_cos();
    DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
}

/// Earth-centred position of `position` on a sphere of `radius`.
pub fn to_cartesian(position: &Cartographic, radius: f64) -> DVec3 {
    unit_vector(position) * (radius + position.height)
}

#[derive(Clone, Debug)]
pub struct SurfaceParams {
    pub seed: u32,
    /// Octaves available to the finest tiles.
    pub octaves: u32,
    /// Height of the first octave in metres.
    pub amplitude: f64,
    /// Frequency of the first octave on the unit sphere.
    pub base_frequency: f64,
    pub lacunarity: f64,
    pub persistence: f64,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 16,
            amplitude: 4000.0,
            base_frequency: 2.0,
            lacunarity: 2.0,
            persistence: 0.5,
        }
    }
}

/// Height field of the procedural globe.
pub struct GlobeSurface {
    noise: Simplex,
    params: SurfaceParams,
}

impl GlobeSurface {
    pub fn new(params: SurfaceParams) -> Self {
        Self {
            noise: Simplex::new(params.seed),
            params,
        }
    }

    /// Terrain height at `position` using at most `octaves` octaves.
    ///
    /// Coarse tiles sample fewer octaves, so heights converge on the finest
    /// answer as deeper tiles load.
    pub fn height(&self, position: &Cartographic, octaves: u32) -> f64 {
        let point = unit_vector(position);
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;

        for _ in 0..octaves.min(self.params.octaves) {
            let p = point * frequency;
            total += self.noise.get([p.x, p.y, p.z]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }
        total
    }

    /// Upper bound of `|height|` (geometric series of the octave amplitudes).
    pub fn max_amplitude(&self) -> f64 {
        let mut sum = 0.0;
        let mut amplitude = self.params.amplitude;
        for _ in 0..self.params.octaves {
            sum += amplitude;
            amplitude *= self.params.persistence;
        }
        sum
    }
}
