//! A scripted camera descent over the procedural globe.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use nebula_config::{Config, ConfigError, DemoConfig};
use nebula_quadtree::{
    Cartographic, FrameState, QuadtreeError, QuadtreePrimitive, QuadtreePrimitiveOptions,
};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use tracing::{debug, info, warn};

use crate::globe_provider::{GlobeTileProvider, LoadStats};

/// Longitude offset, in degrees, of the start of the descent from its target.
const APPROACH_LONGITUDE_DEG: f64 = 60.0;

#[derive(Debug, thiserror::Error)]
pub enum FlightError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Quadtree(#[from] QuadtreeError),
}

/// Camera path: a great descent from high orbit that drifts onto the target.
#[derive(Clone, Debug)]
pub struct FlightPath {
    start: Cartographic,
    target: Cartographic,
    start_altitude: f64,
    end_altitude: f64,
    frames: u32,
}

impl FlightPath {
    pub fn from_config(demo: &DemoConfig) -> Self {
        Self {
            start: Cartographic::from_degrees(
                demo.target_longitude_deg + APPROACH_LONGITUDE_DEG,
                0.0,
                0.0,
            ),
            target: Cartographic::from_degrees(
                demo.target_longitude_deg,
                demo.target_latitude_deg,
                0.0,
            ),
            start_altitude: demo.start_altitude_m,
            end_altitude: demo.end_altitude_m,
            frames: demo.frames,
        }
    }

    /// Camera position on `frame`. Altitude falls geometrically; the ground
    /// track eases onto the target.
    pub fn camera_at(&self, frame: u32) -> Cartographic {
        let t = if self.frames > 1 {
            (f64::from(frame) / f64::from(self.frames - 1)).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let eased = t * t * (3.0 - 2.0 * t);
        let altitude = self.start_altitude * (self.end_altitude / self.start_altitude).powf(t);
        Cartographic::new(
            self.start.longitude + (self.target.longitude - self.start.longitude) * eased,
            self.start.latitude + (self.target.latitude - self.start.latitude) * eased,
            altitude,
        )
    }
}

/// Summary of a completed flight.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlightReport {
    pub frames: u32,
    pub loads: LoadStats,
    pub deepest_level: u32,
    pub rendered_last_frame: usize,
    pub filled_last_frame: usize,
    pub outstanding_loads: usize,
    pub height_answers: usize,
    /// Last reported terrain height of each query, if it was ever answered.
    pub heights: Vec<Option<f64>>,
    pub failed_frames: u32,
}

/// Fly the camera along the configured path, selecting and loading tiles every frame.
pub fn fly(config: &Config) -> Result<FlightReport, FlightError> {
    config.validate()?;
    let demo = &config.demo;

    let mut primitive = QuadtreePrimitive::new(QuadtreePrimitiveOptions {
        tile_provider: Some(GlobeTileProvider::new(demo)),
        config: config.quadtree.clone(),
    })?;

    let heights = Rc::new(RefCell::new(vec![None; demo.height_queries as usize]));
    let answers = Rc::new(Cell::new(0usize));
    let mut rng = Xoshiro256StarStar::seed_from_u64(demo.seed.wrapping_add(1));
    let mut handles = Vec::with_capacity(demo.height_queries as usize);
    for index in 0..demo.height_queries as usize {
        let position = Cartographic::from_degrees(
            demo.target_longitude_deg + rng.gen_range(-0.5..0.5),
            (demo.target_latitude_deg + rng.gen_range(-0.5..0.5)).clamp(-90.0, 90.0),
            0.0,
        );
        let heights = Rc::clone(&heights);
        let answers = Rc::clone(&answers);
        handles.push(primitive.update_height(position, move |surface| {
            heights.borrow_mut()[index] = Some(surface.height);
            answers.set(answers.get() + 1);
        }));
    }

    let previous_outstanding = Rc::new(Cell::new(0usize));
    let progress = Rc::clone(&previous_outstanding);
    let listener = primitive.add_progress_listener(move |outstanding| {
        if outstanding == 0 && progress.get() > 0 {
            info!("All requested tiles loaded");
        }
        progress.set(outstanding);
    });

    let path = FlightPath::from_config(demo);
    let mut frame_state = FrameState::default();
    let mut report = FlightReport {
        frames: demo.frames,
        ..FlightReport::default()
    };

    for frame in 0..demo.frames {
        let camera = path.camera_at(frame);
        frame_state.frame_number = u64::from(frame);
        frame_state.camera_position = Some(camera);

        primitive.update(&frame_state);
        primitive.begin_frame(&frame_state);
        if let Err(err) = primitive.render(&frame_state) {
            warn!("Frame {frame} skipped: {err}");
            report.failed_frames += 1;
        }
        primitive.end_frame(&frame_state);

        let stats = *primitive.stats();
        report.deepest_level = report.deepest_level.max(stats.max_depth_visited);
        debug!(
            frame,
            altitude = camera.height,
            rendered = stats.tiles_rendered,
            depth = stats.max_depth_visited,
            "frame complete"
        );
        if frame % 30 == 0 {
            info!(
                "Frame {frame}: altitude {:.0} m, {} tiles rendered, depth {}, {} loads waiting",
                camera.height,
                stats.tiles_rendered,
                stats.max_depth_visited,
                previous_outstanding.get()
            );
        }
    }

    let provider = primitive.provider();
    report.loads = *provider.stats();
    report.rendered_last_frame = primitive.render_list().len();
    report.filled_last_frame = provider.stats().filled;
    report.outstanding_loads = primitive.load_queues().len();
    report.height_answers = answers.get();

    for handle in handles {
        primitive.remove_height_query(handle);
    }
    primitive.remove_progress_listener(listener);
    report.heights = heights.borrow().clone();

    Ok(report)
}
