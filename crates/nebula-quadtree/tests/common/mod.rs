//! Scripted tile provider shared by the integration tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use nebula_quadtree::{
    Cartographic, FrameState, QuadtreeConfig, QuadtreePrimitive, QuadtreePrimitiveOptions,
    QuadtreeTile, TileAvailability, TileData, TileKey, TileLoadState, TileProvider,
    TileProviderError, TilingScheme, Visibility, estimated_level_zero_geometric_error,
    screen_space_error,
};

pub const RADIUS: f64 = 6_378_137.0;
pub const HEIGHTMAP_WIDTH: u32 = 65;

pub type Tile = QuadtreeTile<MockData>;

/// Tile payload whose surface height is shared with the test.
pub struct MockData {
    pub surface_height: Rc<Cell<f64>>,
    pub picks: Rc<Cell<usize>>,
}

impl TileData for MockData {
    fn pick(&self, position: &Cartographic) -> Option<Cartographic> {
        self.picks.set(self.picks.get() + 1);
        Some(position.with_height(self.surface_height.get()))
    }
}

/// How the mock measures the distance from the camera to a tile.
pub enum Distance {
    /// Great-circle distance to the tile's rectangle combined with camera height.
    Camera,
    /// The same distance for every tile.
    Fixed(f64),
}

/// Calls observed by the mock.
#[derive(Debug, Default)]
pub struct CallLog {
    pub initialize: usize,
    pub update: usize,
    pub begin_update: usize,
    pub end_update: usize,
    pub loads: Vec<TileKey>,
    pub shown: Vec<(TileKey, Option<TileKey>)>,
}

pub struct MockTileProvider {
    pub tiling_scheme: TilingScheme,
    pub ready: bool,
    pub distance: Distance,
    pub visibility: Box<dyn FnMut(TileKey) -> Visibility>,
    pub availability: Box<dyn Fn(TileKey) -> TileAvailability>,
    pub on_load: Box<dyn FnMut(&mut Tile)>,
    pub load_priority: Option<Box<dyn Fn(TileKey) -> f64>>,
    pub failing_tile: Option<TileKey>,
    pub surface_height: Rc<Cell<f64>>,
    pub picks: Rc<Cell<usize>>,
    pub calls: CallLog,
}

impl MockTileProvider {
    /// Everything visible, camera-based distances, loads that complete immediately.
    pub fn new() -> Self {
        let surface_height = Rc::new(Cell::new(0.0));
        let picks = Rc::new(Cell::new(0));
        let on_load = load_immediately(&surface_height, &picks);
        Self {
            tiling_scheme: TilingScheme::geographic(),
            ready: true,
            distance: Distance::Camera,
            visibility: Box::new(|_| Visibility::Intersecting),
            availability: Box::new(|_| TileAvailability::Unknown),
            on_load,
            load_priority: None,
            failing_tile: None,
            surface_height,
            picks,
            calls: CallLog::default(),
        }
    }

    /// A provider that never meets the error threshold and whose loads do nothing.
    pub fn spy() -> Self {
        Self {
            distance: Distance::Fixed(0.0),
            on_load: Box::new(|_| {}),
            ..Self::new()
        }
    }

    /// Replace the load behaviour with an immediate, successful load.
    pub fn loads_immediately(mut self) -> Self {
        self.on_load = load_immediately(&self.surface_height, &self.picks);
        self
    }

    pub fn loads_with(mut self, on_load: impl FnMut(&mut Tile) + 'static) -> Self {
        self.on_load = Box::new(on_load);
        self
    }

    /// Availability known (present) down to `level`, unknown below.
    pub fn available_through(mut self, level: u32) -> Self {
        self.availability = Box::new(move |key| {
            if key.level <= level {
                TileAvailability::Available
            } else {
                TileAvailability::Unknown
            }
        });
        self
    }

    pub fn load_count(&self, key: &TileKey) -> usize {
        self.calls.loads.iter().filter(|k| *k == key).count()
    }

    /// Index of the first load request for `key`.
    pub fn first_load(&self, key: &TileKey) -> Option<usize> {
        self.calls.loads.iter().position(|k| k == key)
    }
}

impl Default for MockTileProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Load callback that marks a tile done and renderable and gives it pickable data.
pub fn load_immediately(
    surface_height: &Rc<Cell<f64>>,
    picks: &Rc<Cell<usize>>,
) -> Box<dyn FnMut(&mut Tile)> {
    let surface_height = Rc::clone(surface_height);
    let picks = Rc::clone(picks);
    Box::new(move |tile| {
        tile.state = TileLoadState::Done;
        tile.renderable = true;
        tile.data = Some(MockData {
            surface_height: Rc::clone(&surface_height),
            picks: Rc::clone(&picks),
        });
    })
}

pub fn geometric_error(level: u32) -> f64 {
    estimated_level_zero_geometric_error(RADIUS, HEIGHTMAP_WIDTH, 2) / f64::from(1u32 << level)
}

impl TileProvider for MockTileProvider {
    type Data = MockData;

    fn tiling_scheme(&self) -> &TilingScheme {
        &self.tiling_scheme
    }

    fn ready(&self) -> bool {
        self.ready
    }

    fn initialize(&mut self, _frame_state: &FrameState) {
        self.calls.initialize += 1;
    }

    fn update(&mut self, _frame_state: &FrameState) {
        self.calls.update += 1;
    }

    fn begin_update(&mut self, _frame_state: &FrameState) {
        self.calls.begin_update += 1;
    }

    fn end_update(&mut self, _frame_state: &FrameState) {
        self.calls.end_update += 1;
    }

    fn level_maximum_geometric_error(&self, level: u32) -> f64 {
        geometric_error(level)
    }

    fn compute_tile_visibility(
        &mut self,
        tile: &Tile,
        _frame_state: &FrameState,
    ) -> Result<Visibility, TileProviderError> {
        if self.failing_tile == Some(tile.key()) {
            return Err(TileProviderError::new("no bounding volume"));
        }
        Ok((self.visibility)(tile.key()))
    }

    fn compute_distance_to_tile(
        &mut self,
        tile: &Tile,
        frame_state: &FrameState,
    ) -> Result<f64, TileProviderError> {
        match self.distance {
            Distance::Fixed(distance) => Ok(distance),
            Distance::Camera => {
                let camera = frame_state
                    .camera_position
                    .ok_or_else(|| TileProviderError::new("camera position unknown"))?;
                let closest = tile.rectangle().closest_point(&camera);
                let surface = camera.angular_distance(&closest) * RADIUS;
                Ok((surface * surface + camera.height * camera.height).sqrt())
            }
        }
    }

    fn load_tile(&mut self, _frame_state: &FrameState, tile: &mut Tile) {
        self.calls.loads.push(tile.key());
        (self.on_load)(tile);
    }

    fn show_tile_this_frame(&mut self, tile: &Tile, fill: Option<&Tile>, _frame_state: &FrameState) {
        self.calls.shown.push((tile.key(), fill.map(QuadtreeTile::key)));
    }

    fn tile_availability(&self, key: TileKey) -> TileAvailability {
        (self.availability)(key)
    }

    fn compute_tile_load_priority(&self, tile: &Tile, _frame_state: &FrameState) -> Option<f64> {
        self.load_priority.as_ref().map(|priority| priority(tile.key()))
    }
}

/// Configuration used by the tests: a generous load budget so every queued tile loads.
pub fn test_config() -> QuadtreeConfig {
    QuadtreeConfig {
        load_queue_time_slice_ms: 10_000.0,
        ..QuadtreeConfig::default()
    }
}

pub fn primitive(provider: MockTileProvider) -> QuadtreePrimitive<MockTileProvider> {
    primitive_with(provider, test_config())
}

pub fn primitive_with(
    provider: MockTileProvider,
    config: QuadtreeConfig,
) -> QuadtreePrimitive<MockTileProvider> {
    QuadtreePrimitive::new(QuadtreePrimitiveOptions {
        tile_provider: Some(provider),
        config,
    })
    .expect("mock provider constructs")
}

/// A frame state whose camera hovers over `target` at the height where tiles
/// of `level` just meet the error threshold, and finer ones are not needed.
pub fn looking_at(target: Cartographic, level: u32, maximum_screen_space_error: f64) -> FrameState {
    let mut frame_state = FrameState::default();
    let sse = maximum_screen_space_error * 0.8;
    let height = geometric_error(level) * frame_state.drawing_buffer_height
        / (sse * frame_state.sse_denominator);
    frame_state.camera_position = Some(target.with_height(height));
    debug_assert!(screen_space_error(geometric_error(level), height, &frame_state) < maximum_screen_space_error);
    frame_state
}

pub fn run_frame(primitive: &mut QuadtreePrimitive<MockTileProvider>, frame_state: &mut FrameState) {
    frame_state.frame_number += 1;
    primitive.update(frame_state);
    primitive.begin_frame(frame_state);
    primitive.render(frame_state).expect("selection succeeds");
    primitive.end_frame(frame_state);
}

/// Run frames until `done` holds, at most `limit` frames. Returns the number of frames run.
pub fn run_until(
    primitive: &mut QuadtreePrimitive<MockTileProvider>,
    frame_state: &mut FrameState,
    limit: usize,
    mut done: impl FnMut(&QuadtreePrimitive<MockTileProvider>) -> bool,
) -> usize {
    for frame in 1..=limit {
        run_frame(primitive, frame_state);
        assert_render_list_is_valid(primitive);
        assert_queues_are_valid(primitive);
        if done(primitive) {
            return frame;
        }
    }
    panic!("condition not reached within {limit} frames");
}

pub fn rendered(primitive: &QuadtreePrimitive<MockTileProvider>) -> Vec<TileKey> {
    primitive.render_list().iter().map(|entry| entry.key).collect()
}

pub fn is_rendered(primitive: &QuadtreePrimitive<MockTileProvider>, key: &TileKey) -> bool {
    primitive.render_list().iter().any(|entry| entry.key == *key)
}

/// Every render entry is renderable itself, or a fill drawn from a renderable ancestor.
pub fn assert_render_list_is_valid(primitive: &QuadtreePrimitive<MockTileProvider>) {
    for entry in primitive.render_list() {
        let tile = primitive.tile(&entry.key).expect("rendered tile exists");
        if tile.renderable {
            assert!(entry.fill.is_none(), "{} is renderable but has a fill", entry.key);
            continue;
        }
        let fill = entry
            .fill
            .unwrap_or_else(|| panic!("{} is not renderable and has no fill", entry.key));
        assert!(fill.is_ancestor_of(&entry.key), "fill {fill} is not an ancestor of {}", entry.key);
        assert!(
            primitive.tile(&fill).is_some_and(|t| t.renderable),
            "fill {fill} is not renderable"
        );
    }
}

/// No tile sits in two queues, and queued tiles still need loading.
pub fn assert_queues_are_valid(primitive: &QuadtreePrimitive<MockTileProvider>) {
    let mut seen = std::collections::HashSet::new();
    for entry in primitive.load_queues().iter_dispatch_order() {
        assert!(seen.insert(entry.key), "{} queued twice", entry.key);
    }
}

/// Key of the child of `key` in `quadrant`.
pub fn child(key: TileKey, quadrant: nebula_quadtree::Quadrant) -> TileKey {
    key.children()[quadrant.index()]
}
