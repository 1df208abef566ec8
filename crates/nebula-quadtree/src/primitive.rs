//! Frame orchestration of the quadtree: selection, load dispatch, height
//! queries and progress reporting.

use std::time::{Duration, Instant};

use nebula_config::QuadtreeConfig;

use crate::events::{ListenerHandle, ProgressListener, TileLoadProgressEvent};
use crate::height_query::{HeightQueryCache, HeightQueryHandle};
use crate::load_queue::{LoadPriority, QueuedTile, TileLoadQueues};
use crate::provider::{FrameState, TileProvider};
use crate::selector::{RenderEntry, SelectionStats, TileSelector};
use crate::tile::{QuadtreeTile, TileKey, TileLoadState, find_tile, find_tile_mut};
use crate::{Cartographic, QuadtreeError};

/// Construction options for [`QuadtreePrimitive`].
pub struct QuadtreePrimitiveOptions<P> {
    pub tile_provider: Option<P>,
    pub config: QuadtreeConfig,
}

impl<P> Default for QuadtreePrimitiveOptions<P> {
    fn default() -> Self {
        Self {
            tile_provider: None,
            config: QuadtreeConfig::default(),
        }
    }
}

/// Renders a globe surface as a quadtree of tiles supplied by a [`TileProvider`].
///
/// Each frame is driven as `update`, `begin_frame`, `render`, `end_frame`.
/// `render` selects the tiles to draw and the tiles to load; `end_frame`
/// hands the loads to the provider within a time budget.
pub struct QuadtreePrimitive<P: TileProvider> {
    provider: P,
    config: QuadtreeConfig,
    level_zero_tiles: Vec<QuadtreeTile<P::Data>>,
    selector: TileSelector,
    render_list: Vec<RenderEntry>,
    load_queues: TileLoadQueues,
    height_queries: HeightQueryCache,
    progress_event: TileLoadProgressEvent,
    initialized: bool,
    tiles_invalidated: bool,
    last_logged_stats: Option<SelectionStats>,
}

impl<P: TileProvider> QuadtreePrimitive<P> {
    /// Create a primitive. Fails immediately when no provider is given.
    pub fn new(options: QuadtreePrimitiveOptions<P>) -> Result<Self, QuadtreeError> {
        let provider = options
            .tile_provider
            .ok_or(QuadtreeError::MissingTileProvider)?;
        let level_zero_tiles = QuadtreeTile::create_level_zero_tiles(provider.tiling_scheme());
        if level_zero_tiles.is_empty() {
            return Err(QuadtreeError::EmptyTilingScheme);
        }
        tracing::debug!(
            "quadtree created with {} level-zero tiles",
            level_zero_tiles.len()
        );

        Ok(Self {
            provider,
            config: options.config,
            level_zero_tiles,
            selector: TileSelector::new(),
            render_list: Vec::new(),
            load_queues: TileLoadQueues::new(),
            height_queries: HeightQueryCache::new(),
            progress_event: TileLoadProgressEvent::new(),
            initialized: false,
            tiles_invalidated: false,
            last_logged_stats: None,
        })
    }

    /// Create a primitive with the default configuration.
    pub fn with_provider(provider: P) -> Result<Self, QuadtreeError> {
        Self::new(QuadtreePrimitiveOptions {
            tile_provider: Some(provider),
            ..QuadtreePrimitiveOptions::default()
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn config(&self) -> &QuadtreeConfig {
        &self.config
    }

    /// Mutable configuration; changes apply from the next selection pass.
    pub fn config_mut(&mut self) -> &mut QuadtreeConfig {
        &mut self.config
    }

    pub fn set_maximum_screen_space_error(&mut self, value: f64) {
        self.config.maximum_screen_space_error = value;
    }

    pub fn set_loading_descendant_limit(&mut self, value: usize) {
        self.config.loading_descendant_limit = value;
    }

    pub fn set_preload_ancestors(&mut self, value: bool) {
        self.config.preload_ancestors = value;
    }

    pub fn set_preload_siblings(&mut self, value: bool) {
        self.config.preload_siblings = value;
    }

    /// Let the provider prepare for the coming frame.
    pub fn update(&mut self, frame_state: &FrameState) {
        self.provider.update(frame_state);
    }

    /// Reset per-frame state. Applies a pending invalidation first.
    pub fn begin_frame(&mut self, frame_state: &FrameState) {
        if self.tiles_invalidated {
            self.rebuild_tiles();
            self.tiles_invalidated = false;
        }

        if !self.initialized {
            self.provider.initialize(frame_state);
            self.initialized = true;
        }

        self.load_queues.clear();
        if self.config.suspend_lod_update {
            return;
        }
        self.render_list.clear();
    }

    /// Select tiles and show them through the provider.
    ///
    /// Nothing is selected while the provider is not ready. If the provider
    /// fails during selection, the frame's render list and load queues are
    /// left empty and the error is returned.
    pub fn render(&mut self, frame_state: &FrameState) -> Result<(), QuadtreeError> {
        self.provider.begin_update(frame_state);
        let result = self.select_tiles(frame_state);
        if result.is_ok() {
            self.show_selected_tiles(frame_state);
        }
        self.provider.end_update(frame_state);
        result
    }

    fn select_tiles(&mut self, frame_state: &FrameState) -> Result<(), QuadtreeError> {
        if self.config.suspend_lod_update {
            return Ok(());
        }
        if !self.provider.ready() {
            self.render_list.clear();
            return Ok(());
        }
        self.selector.select(
            &mut self.level_zero_tiles,
            &mut self.provider,
            &self.config,
            frame_state,
            &mut self.render_list,
            &mut self.load_queues,
        )
    }

    fn show_selected_tiles(&mut self, frame_state: &FrameState) {
        for entry in &self.render_list {
            let Some(tile) = find_tile(&self.level_zero_tiles, &entry.key) else {
                tracing::warn!("selected tile {} no longer exists", entry.key);
                continue;
            };
            let fill = entry
                .fill
                .and_then(|key| find_tile(&self.level_zero_tiles, &key));
            self.provider.show_tile_this_frame(tile, fill, frame_state);
        }
    }

    /// Dispatch queued loads, answer height queries and report progress.
    pub fn end_frame(&mut self, frame_state: &FrameState) {
        self.process_load_queues(frame_state);
        self.height_queries.update(&mut self.level_zero_tiles);
        self.update_tile_load_progress();
    }

    fn process_load_queues(&mut self, frame_state: &FrameState) {
        self.selector.stats_mut().tiles_dispatched = 0;
        if self.load_queues.is_empty() {
            return;
        }
        self.load_queues.sort_by_load_priority();

        let time_slice =
            Duration::try_from_secs_f64(self.config.load_queue_time_slice_ms / 1000.0)
                .unwrap_or_default();
        let deadline = Instant::now() + time_slice;

        let mut dispatched = 0;
        for entry in self.load_queues.iter_dispatch_order() {
            if dispatched > 0 && Instant::now() >= deadline {
                break;
            }
            let Some(tile) = find_tile_mut(&mut self.level_zero_tiles, &entry.key) else {
                continue;
            };
            if !tile.needs_loading() {
                continue;
            }
            tracing::trace!("loading tile {}", entry.key);
            self.provider.load_tile(frame_state, tile);
            dispatched += 1;
        }
        self.selector.stats_mut().tiles_dispatched = dispatched;
    }

    fn update_tile_load_progress(&mut self) {
        let outstanding = self.load_queues.len();
        self.progress_event.raise(outstanding);

        let stats = *self.selector.stats();
        tracing::debug!(
            visited = stats.tiles_visited,
            culled = stats.tiles_culled,
            rendered = stats.tiles_rendered,
            waiting = stats.tiles_waiting_for_children,
            max_depth = stats.max_depth_visited,
            dispatched = stats.tiles_dispatched,
            outstanding,
            "frame selection"
        );

        if self.config.debug_output
            && !self.config.suspend_lod_update
            && self.last_logged_stats != Some(stats)
        {
            tracing::info!(
                "visited {}, culled {}, rendered {}, waiting for children {}, max depth {}, loads outstanding {}",
                stats.tiles_visited,
                stats.tiles_culled,
                stats.tiles_rendered,
                stats.tiles_waiting_for_children,
                stats.max_depth_visited,
                outstanding
            );
            self.last_logged_stats = Some(stats);
        }
    }

    /// Drop every tile at the next `begin_frame` and start again from level zero.
    pub fn invalidate_all_tiles(&mut self) {
        self.tiles_invalidated = true;
    }

    fn rebuild_tiles(&mut self) {
        tracing::debug!("rebuilding quadtree from level zero");
        self.level_zero_tiles = QuadtreeTile::create_level_zero_tiles(self.provider.tiling_scheme());
        self.height_queries.detach_all();
        self.selector.reset();
        self.render_list.clear();
        self.load_queues.clear();
    }

    /// Visit every created tile that has left the `Start` state.
    pub fn for_each_loaded_tile(&self, mut callback: impl FnMut(&QuadtreeTile<P::Data>)) {
        for root in &self.level_zero_tiles {
            root.for_each_tile(&mut |tile| {
                if tile.state != TileLoadState::Start {
                    callback(tile);
                }
            });
        }
    }

    /// Visit the tiles selected this frame in render order, with their fill source.
    pub fn for_each_rendered_tile(
        &self,
        mut callback: impl FnMut(&QuadtreeTile<P::Data>, Option<&QuadtreeTile<P::Data>>),
    ) {
        for entry in &self.render_list {
            if let Some(tile) = find_tile(&self.level_zero_tiles, &entry.key) {
                let fill = entry
                    .fill
                    .and_then(|key| find_tile(&self.level_zero_tiles, &key));
                callback(tile, fill);
            }
        }
    }

    /// Register a height query at `position`. `callback` receives the surface
    /// position at the end of every frame in which loaded data covers it.
    pub fn update_height(
        &mut self,
        position: Cartographic,
        callback: impl FnMut(&Cartographic) + 'static,
    ) -> HeightQueryHandle {
        self.height_queries.register(position, Box::new(callback))
    }

    /// Unregister a height query. Returns false if it was already removed.
    pub fn remove_height_query(&mut self, handle: HeightQueryHandle) -> bool {
        self.height_queries.remove(handle, &mut self.level_zero_tiles)
    }

    pub fn height_queries(&self) -> &HeightQueryCache {
        &self.height_queries
    }

    /// Listen to the number of tiles still waiting to load, reported every frame.
    pub fn add_progress_listener(&mut self, listener: impl FnMut(usize) + 'static) -> ListenerHandle {
        let listener: ProgressListener = Box::new(listener);
        self.progress_event.add_listener(listener)
    }

    pub fn remove_progress_listener(&mut self, handle: ListenerHandle) -> bool {
        self.progress_event.remove_listener(handle)
    }

    pub fn level_zero_tiles(&self) -> &[QuadtreeTile<P::Data>] {
        &self.level_zero_tiles
    }

    pub fn level_zero_tiles_mut(&mut self) -> &mut [QuadtreeTile<P::Data>] {
        &mut self.level_zero_tiles
    }

    /// A created tile by key.
    pub fn tile(&self, key: &TileKey) -> Option<&QuadtreeTile<P::Data>> {
        find_tile(&self.level_zero_tiles, key)
    }

    pub fn tile_mut(&mut self, key: &TileKey) -> Option<&mut QuadtreeTile<P::Data>> {
        find_tile_mut(&mut self.level_zero_tiles, key)
    }

    /// Tiles selected by the last `render`, near to far.
    pub fn render_list(&self) -> &[RenderEntry] {
        &self.render_list
    }

    pub fn load_queue(&self, priority: LoadPriority) -> &[QueuedTile] {
        self.load_queues.queue(priority)
    }

    pub fn load_queues(&self) -> &TileLoadQueues {
        &self.load_queues
    }

    pub fn stats(&self) -> &SelectionStats {
        self.selector.stats()
    }
}

impl<P: TileProvider> std::fmt::Debug for QuadtreePrimitive<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuadtreePrimitive")
            .field("config", &self.config)
            .field("level_zero_tiles", &self.level_zero_tiles.len())
            .field("render_list", &self.render_list.len())
            .field("load_queues", &self.load_queues.len())
            .field("height_queries", &self.height_queries.len())
            .finish()
    }
}
