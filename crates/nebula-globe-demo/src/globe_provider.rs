//! A tile provider for a procedural globe with simulated network loading.
//!
//! Tiles up to `max_level` are "downloaded": each load takes a configurable
//! number of frames and may fail. Tiles below `max_level` have no data of
//! their own and are upsampled from the parent level instantly.

use std::rc::Rc;

use glam::DVec3;
use nebula_config::DemoConfig;
use nebula_quadtree::{
    Cartographic, FrameState, QuadtreeTile, Rectangle, TileAvailability, TileData, TileKey,
    TileLoadState, TileProvider, TileProviderError, TilingScheme, Visibility,
    estimated_level_zero_geometric_error,
};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use rustc_hash::FxHashMap;
use tracing::{debug, info, trace, warn};

use crate::horizon::HorizonCuller;
use crate::surface::{GlobeSurface, SurfaceParams, to_cartesian};

const HEIGHTMAP_WIDTH: u32 = 65;

/// Terrain of one loaded tile.
pub struct GlobeTileData {
    surface: Rc<GlobeSurface>,
    octaves: u32,
}

impl GlobeTileData {
    pub fn octaves(&self) -> u32 {
        self.octaves
    }
}

impl TileData for GlobeTileData {
    fn pick(&self, position: &Cartographic) -> Option<Cartographic> {
        Some(position.with_height(self.surface.height(position, self.octaves)))
    }
}

/// Running totals of provider activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub requested: usize,
    pub completed: usize,
    pub failed: usize,
    pub upsampled: usize,
    /// Tiles shown in the last frame.
    pub shown: usize,
    /// Tiles shown in the last frame through an ancestor's content.
    pub filled: usize,
}

pub struct GlobeTileProvider {
    tiling_scheme: TilingScheme,
    surface: Rc<GlobeSurface>,
    radius: f64,
    max_level: u32,
    load_latency_frames: u32,
    failure_rate: f64,
    level_zero_error: f64,
    rng: Xoshiro256StarStar,
    in_flight: FxHashMap<TileKey, u64>,
    horizon: Option<HorizonCuller>,
    stats: LoadStats,
}

impl GlobeTileProvider {
    pub fn new(config: &DemoConfig) -> Self {
        let surface = GlobeSurface::new(SurfaceParams {
            seed: config.seed as u32,
            ..SurfaceParams::default()
        });
        Self {
            tiling_scheme: TilingScheme::geographic(),
            surface: Rc::new(surface),
            radius: config.radius_m,
            max_level: config.max_level,
            load_latency_frames: config.load_latency_frames,
            failure_rate: config.failure_rate.clamp(0.0, 1.0),
            level_zero_error: estimated_level_zero_geometric_error(
                config.radius_m,
                HEIGHTMAP_WIDTH,
                2,
            ),
            rng: Xoshiro256StarStar::seed_from_u64(config.seed),
            in_flight: FxHashMap::default(),
            horizon: None,
            stats: LoadStats::default(),
        }
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    /// Number of tiles requested but not yet finished.
    pub fn loads_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn octaves_for_level(&self, level: u32) -> u32 {
        level.min(self.max_level) + 2
    }

    /// Bounding sphere of a tile's terrain: centre on the sphere, radius
    /// reaching every corner and edge midpoint plus the tallest possible relief.
    fn bounding_sphere(&self, rectangle: &Rectangle) -> (DVec3, f64) {
        let center = to_cartesian(&rectangle.center(), self.radius);
        let mid_longitude = rectangle.center().longitude;
        let mid_latitude = (rectangle.south + rectangle.north) * 0.5;
        let samples = [
            (rectangle.west, rectangle.south),
            (rectangle.west, rectangle.north),
            (rectangle.east, rectangle.south),
            (rectangle.east, rectangle.north),
            (rectangle.west, mid_latitude),
            (rectangle.east, mid_latitude),
            (mid_longitude, rectangle.south),
            (mid_longitude, rectangle.north),
        ];
        let reach = samples
            .iter()
            .map(|&(longitude, latitude)| {
                let point = to_cartesian(&Cartographic::new(longitude, latitude, 0.0), self.radius);
                point.distance(center)
            })
            .fold(0.0, f64::max);
        (center, reach + self.surface.max_amplitude())
    }

    fn finish_load(&mut self, tile: &mut QuadtreeTile<GlobeTileData>) {
        tile.data = Some(GlobeTileData {
            surface: Rc::clone(&self.surface),
            octaves: self.octaves_for_level(tile.level()),
        });
        tile.state = TileLoadState::Done;
        tile.renderable = true;
    }
}

impl TileProvider for GlobeTileProvider {
    type Data = GlobeTileData;

    fn tiling_scheme(&self) -> &TilingScheme {
        &self.tiling_scheme
    }

    fn initialize(&mut self, _frame_state: &FrameState) {
        info!(
            "Globe provider: radius {:.0} m, data to level {}, latency {} frames, failure rate {:.3}",
            self.radius, self.max_level, self.load_latency_frames, self.failure_rate
        );
    }

    fn begin_update(&mut self, frame_state: &FrameState) {
        self.horizon = frame_state
            .camera_position
            .map(|camera| HorizonCuller::new(to_cartesian(&camera, self.radius), self.radius));
        self.stats.shown = 0;
        self.stats.filled = 0;
    }

    fn end_update(&mut self, frame_state: &FrameState) {
        let (altitude, horizon) = self
            .horizon
            .as_ref()
            .map_or((0.0, 0.0), |h| (h.camera_altitude(), h.horizon_distance()));
        trace!(
            frame = frame_state.frame_number,
            shown = self.stats.shown,
            filled = self.stats.filled,
            in_flight = self.loads_in_flight(),
            altitude,
            horizon,
            "globe surface drawn"
        );
    }

    fn level_maximum_geometric_error(&self, level: u32) -> f64 {
        self.level_zero_error / 2f64.powi(level as i32)
    }

    fn compute_tile_visibility(
        &mut self,
        tile: &QuadtreeTile<GlobeTileData>,
        frame_state: &FrameState,
    ) -> Result<Visibility, TileProviderError> {
        let Some(horizon) = &self.horizon else {
            return Ok(Visibility::Intersecting);
        };
        if frame_state
            .camera_position
            .is_some_and(|camera| tile.rectangle().contains(&camera))
        {
            return Ok(Visibility::Intersecting);
        }

        let (center, bounds) = self.bounding_sphere(tile.rectangle());
        if !center.is_finite() || !bounds.is_finite() {
            return Err(TileProviderError::new(format!(
                "degenerate bounding sphere for {}",
                tile.key()
            )));
        }
        if horizon.is_above_horizon(center, bounds) {
            Ok(Visibility::Intersecting)
        } else {
            Ok(Visibility::Outside)
        }
    }

    fn compute_distance_to_tile(
        &mut self,
        tile: &QuadtreeTile<GlobeTileData>,
        frame_state: &FrameState,
    ) -> Result<f64, TileProviderError> {
        let camera = frame_state
            .camera_position
            .ok_or_else(|| TileProviderError::new("camera position is not set"))?;
        let closest = tile.rectangle().closest_point(&camera);
        let along_surface = camera.angular_distance(&closest) * self.radius;
        let above_terrain = (camera.height - self.surface.max_amplitude()).max(0.0);
        Ok(along_surface.hypot(above_terrain))
    }

    fn load_tile(&mut self, frame_state: &FrameState, tile: &mut QuadtreeTile<GlobeTileData>) {
        let key = tile.key();
        if key.level > self.max_level {
            tile.upsampled_from_parent = true;
            self.finish_load(tile);
            self.stats.upsampled += 1;
            trace!("upsampled {key}");
            return;
        }

        match tile.state {
            TileLoadState::Start => {
                tile.state = TileLoadState::Loading;
                self.in_flight
                    .insert(key, frame_state.frame_number + u64::from(self.load_latency_frames));
                self.stats.requested += 1;
                trace!("requested {key}");
            }
            TileLoadState::Loading => {}
            TileLoadState::Done | TileLoadState::Failed => return,
        }

        let ready_at = self.in_flight.get(&key).copied().unwrap_or_default();
        if frame_state.frame_number < ready_at {
            return;
        }
        self.in_flight.remove(&key);

        if self.rng.gen_bool(self.failure_rate) {
            tile.state = TileLoadState::Failed;
            self.stats.failed += 1;
            warn!("Failed to load tile {key}");
            return;
        }
        self.finish_load(tile);
        self.stats.completed += 1;
        if let Some(data) = &tile.data {
            debug!(octaves = data.octaves(), "loaded {key}");
        }
    }

    fn show_tile_this_frame(
        &mut self,
        tile: &QuadtreeTile<GlobeTileData>,
        fill: Option<&QuadtreeTile<GlobeTileData>>,
        _frame_state: &FrameState,
    ) {
        self.stats.shown += 1;
        if let Some(fill) = fill {
            self.stats.filled += 1;
            trace!("{} drawn from {}", tile.key(), fill.key());
        }
    }

    fn tile_availability(&self, key: TileKey) -> TileAvailability {
        if key.level <= self.max_level {
            TileAvailability::Available
        } else {
            TileAvailability::Unavailable
        }
    }

    /// Upsampled tiles are never refined further.
    fn can_refine(&self, tile: &QuadtreeTile<GlobeTileData>) -> bool {
        tile.level() <= self.max_level
    }

    fn can_render_without_losing_detail(&self, tile: &QuadtreeTile<GlobeTileData>) -> bool {
        tile.renderable && !tile.upsampled_from_parent
    }

    fn compute_tile_load_priority(
        &self,
        tile: &QuadtreeTile<GlobeTileData>,
        frame_state: &FrameState,
    ) -> Option<f64> {
        let camera = frame_state.camera_position?;
        Some(tile.rectangle().center().angular_distance(&camera))
    }
}
