//! Per-frame tile selection.
//!
//! Walks the quadtree from the level-zero tiles, deciding for every visible
//! tile whether to render it, refine it into its children, or render an
//! ancestor in its place, and queues the loads needed to improve the next
//! frame.
//!
//! Rendering never loses detail that was on screen last frame: a tile that
//! would be good enough but is not ready keeps its rendered descendants on
//! screen until it can take over.

use nebula_config::QuadtreeConfig;

use crate::load_queue::{LoadPriority, TileLoadQueues};
use crate::provider::{FrameState, TileData, TileProvider, Visibility};
use crate::tile::{Quadrant, QuadtreeTile, TileKey, TileLoadState, TileSelectionResult};
use crate::{Cartographic, QuadtreeError, Rectangle, TilingScheme};

/// One entry of the ordered render list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderEntry {
    pub key: TileKey,
    /// Nearest renderable ancestor whose content is drawn clipped to this
    /// tile's footprint. Set only when the tile itself is not renderable.
    pub fill: Option<TileKey>,
}

/// Counters describing the most recent selection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectionStats {
    pub tiles_visited: usize,
    pub tiles_culled: usize,
    pub tiles_rendered: usize,
    /// Tiles rendered in place of descendants that are not ready yet.
    pub tiles_waiting_for_children: usize,
    pub max_depth_visited: u32,
    pub tiles_dispatched: usize,
}

/// Summary of what happened below a tile, reported back up the traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraversalDetails {
    /// Every selected tile in the subtree is renderable.
    pub all_are_renderable: bool,
    /// At least one selected tile in the subtree was rendered last frame.
    pub any_were_rendered_last_frame: bool,
    /// Selected tiles in the subtree that are still waiting for data.
    pub not_yet_renderable_count: usize,
}

impl Default for TraversalDetails {
    fn default() -> Self {
        Self {
            all_are_renderable: true,
            any_were_rendered_last_frame: false,
            not_yet_renderable_count: 0,
        }
    }
}

impl TraversalDetails {
    fn for_rendered_tile<D>(tile: &QuadtreeTile<D>, rendered_last_frame: bool) -> Self {
        Self {
            all_are_renderable: tile.renderable,
            any_were_rendered_last_frame: rendered_last_frame,
            not_yet_renderable_count: usize::from(!tile.renderable),
        }
    }

    /// Merge the details of the four children of a tile.
    #[must_use]
    pub fn combine(quad: &[TraversalDetails; 4]) -> Self {
        Self {
            all_are_renderable: quad.iter().all(|d| d.all_are_renderable),
            any_were_rendered_last_frame: quad.iter().any(|d| d.any_were_rendered_last_frame),
            not_yet_renderable_count: quad.iter().map(|d| d.not_yet_renderable_count).sum(),
        }
    }
}

/// Screen-space error of a tile with `max_geometric_error` seen from `distance`.
#[must_use]
pub fn screen_space_error(max_geometric_error: f64, distance: f64, frame_state: &FrameState) -> f64 {
    let mut error =
        max_geometric_error * frame_state.drawing_buffer_height / (distance * frame_state.sse_denominator);
    if let Some(fog) = &frame_state.fog {
        error -= fog.factor(distance) * fog.sse;
    }
    error / frame_state.pixel_ratio
}

/// Order in which to visit the children of a tile, nearest to the camera first.
///
/// The quadrant holding the camera comes first, then its two edge neighbours,
/// then the diagonal one.
#[must_use]
pub fn near_to_far_order(southwest: &Rectangle, camera: Option<&Cartographic>) -> [Quadrant; 4] {
    use Quadrant::{Northeast, Northwest, Southeast, Southwest};

    let Some(camera) = camera else {
        return Quadrant::ALL;
    };
    let west = camera.longitude < southwest.east;
    let south = camera.latitude < southwest.north;
    match (west, south) {
        (true, true) => [Southwest, Southeast, Northwest, Northeast],
        (true, false) => [Northwest, Southwest, Northeast, Southeast],
        (false, true) => [Southeast, Southwest, Northeast, Northwest],
        (false, false) => [Northeast, Northwest, Southeast, Southwest],
    }
}

/// Selection state carried between frames.
#[derive(Debug, Default)]
pub struct TileSelector {
    pass: u64,
    last_pass: Option<u64>,
    stats: SelectionStats,
}

impl TileSelector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &SelectionStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut SelectionStats {
        &mut self.stats
    }

    /// Identifier of the last completed selection pass.
    pub fn last_pass(&self) -> Option<u64> {
        self.last_pass
    }

    /// Forget the previous pass, so no tile counts as rendered last frame.
    pub fn reset(&mut self) {
        self.last_pass = None;
    }

    /// Run one selection pass, filling `render_list` and `queues`.
    ///
    /// On a provider error both outputs are cleared before the error is returned.
    pub fn select<P: TileProvider>(
        &mut self,
        roots: &mut [QuadtreeTile<P::Data>],
        provider: &mut P,
        config: &QuadtreeConfig,
        frame_state: &FrameState,
        render_list: &mut Vec<RenderEntry>,
        queues: &mut TileLoadQueues,
    ) -> Result<(), QuadtreeError> {
        self.stats = SelectionStats::default();
        self.pass += 1;
        render_list.clear();

        let tiling_scheme = provider.tiling_scheme().clone();
        let camera = frame_state.camera_position;

        let mut order: Vec<usize> = (0..roots.len()).collect();
        if let Some(camera) = camera {
            order.sort_by(|&a, &b| {
                let da = roots[a].rectangle().center().angular_distance(&camera);
                let db = roots[b].rectangle().center().angular_distance(&camera);
                da.total_cmp(&db)
            });
        }

        let result = {
            let mut traversal = Traversal {
                provider,
                config,
                frame_state,
                tiling_scheme: &tiling_scheme,
                render_list: &mut *render_list,
                queues: &mut *queues,
                stats: &mut self.stats,
                pass: self.pass,
                last_pass: self.last_pass,
            };
            order
                .iter()
                .try_for_each(|&index| traversal.visit_root(&mut roots[index]))
        };

        if let Err(err) = result {
            render_list.clear();
            queues.clear();
            self.last_pass = None;
            return Err(err);
        }

        self.stats.tiles_rendered = render_list.len();
        self.last_pass = Some(self.pass);
        Ok(())
    }
}

struct Traversal<'a, P: TileProvider> {
    provider: &'a mut P,
    config: &'a QuadtreeConfig,
    frame_state: &'a FrameState,
    tiling_scheme: &'a TilingScheme,
    render_list: &'a mut Vec<RenderEntry>,
    queues: &'a mut TileLoadQueues,
    stats: &'a mut SelectionStats,
    pass: u64,
    last_pass: Option<u64>,
}

impl<P: TileProvider> Traversal<'_, P> {
    fn visit_root(&mut self, tile: &mut QuadtreeTile<P::Data>) -> Result<(), QuadtreeError> {
        if !tile.renderable {
            self.queue_tile_load(LoadPriority::High, tile);
            self.stats.tiles_waiting_for_children += 1;
            return Ok(());
        }
        self.visit_if_visible(tile, false, None).map(|_| ())
    }

    fn visit_if_visible(
        &mut self,
        tile: &mut QuadtreeTile<P::Data>,
        ancestor_meets_sse: bool,
        fill_source: Option<TileKey>,
    ) -> Result<TraversalDetails, QuadtreeError> {
        let visibility = self
            .provider
            .compute_tile_visibility(tile, self.frame_state)
            .map_err(|source| QuadtreeError::Provider {
                tile: tile.key(),
                source,
            })?;
        if visibility != Visibility::Outside {
            return self.visit_tile(tile, ancestor_meets_sse, fill_source);
        }

        self.stats.tiles_culled += 1;

        let result = if self.contains_needed_position(tile) {
            // Only the geometry is needed here, not a renderable tile.
            if !tile.data.as_ref().is_some_and(TileData::has_geometry) {
                self.queue_tile_load(LoadPriority::Medium, tile);
            }
            TileSelectionResult::CulledButNeeded
        } else {
            if self.config.preload_siblings || tile.level() == 0 {
                self.queue_tile_load(LoadPriority::Low, tile);
            }
            TileSelectionResult::Culled
        };
        tile.set_selection_result(result, self.pass);

        Ok(TraversalDetails::default())
    }

    fn visit_tile(
        &mut self,
        tile: &mut QuadtreeTile<P::Data>,
        mut ancestor_meets_sse: bool,
        fill_source: Option<TileKey>,
    ) -> Result<TraversalDetails, QuadtreeError> {
        self.stats.tiles_visited += 1;
        self.stats.max_depth_visited = self.stats.max_depth_visited.max(tile.level());

        tile.distance = self
            .provider
            .compute_distance_to_tile(tile, self.frame_state)
            .map_err(|source| QuadtreeError::Provider {
                tile: tile.key(),
                source,
            })?;
        let error = screen_space_error(
            self.provider.level_maximum_geometric_error(tile.level()),
            tile.distance,
            self.frame_state,
        );
        let meets_sse = error < self.config.maximum_screen_space_error;

        let last_result = tile.selection_result_on(self.last_pass);
        let rendered_last_frame = last_result == TileSelectionResult::Rendered;

        if meets_sse || ancestor_meets_sse {
            let original = last_result.original();
            let can_render = original == TileSelectionResult::Rendered
                || original == TileSelectionResult::Culled
                || last_result == TileSelectionResult::None
                || tile.state == TileLoadState::Done
                || self.provider.can_render_without_losing_detail(tile);

            if can_render {
                if meets_sse {
                    self.queue_tile_load(LoadPriority::Medium, tile);
                }
                return Ok(self.render_tile(tile, fill_source, rendered_last_frame));
            }

            // Keep rendering whatever was on screen below this tile until it is ready.
            ancestor_meets_sse = true;
            if meets_sse {
                self.queue_tile_load(LoadPriority::High, tile);
            }
        }

        if !self.provider.can_refine(tile) {
            // Whether refining means a load or an upsample is unknown until this tile loads.
            self.queue_tile_load(LoadPriority::High, tile);
            return Ok(self.render_tile(tile, fill_source, rendered_last_frame));
        }

        tile.ensure_children(self.tiling_scheme);
        if tile.children_upsampled() {
            self.queue_tile_load(LoadPriority::Medium, tile);
            return Ok(self.render_tile(tile, fill_source, rendered_last_frame));
        }

        tile.set_selection_result(TileSelectionResult::Refined, self.pass);

        let first_rendered_descendant = self.render_list.len();
        let checkpoint = self.queues.checkpoint();
        let child_fill_source = if tile.renderable {
            Some(tile.key())
        } else {
            fill_source
        };

        let mut details =
            self.visit_children_near_to_far(tile, ancestor_meets_sse, child_fill_source)?;

        if first_rendered_descendant == self.render_list.len() {
            // Every descendant was culled.
            return Ok(details);
        }

        let mut queued_for_load = false;
        if !details.all_are_renderable && !details.any_were_rendered_last_frame {
            self.kick_descendants(tile, first_rendered_descendant);
            self.render_list.truncate(first_rendered_descendant);
            self.add_to_render_list(tile, fill_source);
            tile.set_selection_result(TileSelectionResult::Rendered, self.pass);

            if !rendered_last_frame
                && details.not_yet_renderable_count > self.config.loading_descendant_limit
            {
                let dropped = self.queues.rewind(checkpoint);
                tracing::trace!(
                    "{} waits on {} descendants, dropped {} loads in favour of itself",
                    tile.key(),
                    details.not_yet_renderable_count,
                    dropped.len()
                );
                self.queue_tile_load(LoadPriority::Medium, tile);
                details.not_yet_renderable_count = usize::from(!tile.renderable);
                queued_for_load = true;
            }

            details.all_are_renderable = tile.renderable;
            details.any_were_rendered_last_frame = rendered_last_frame;
            self.stats.tiles_waiting_for_children += 1;
        }

        if self.config.preload_ancestors && !queued_for_load {
            self.queue_tile_load(LoadPriority::Low, tile);
        }

        Ok(details)
    }

    fn visit_children_near_to_far(
        &mut self,
        tile: &mut QuadtreeTile<P::Data>,
        ancestor_meets_sse: bool,
        fill_source: Option<TileKey>,
    ) -> Result<TraversalDetails, QuadtreeError> {
        let children = tile.ensure_children(self.tiling_scheme);
        let order = near_to_far_order(
            children[Quadrant::Southwest.index()].rectangle(),
            self.frame_state.camera_position.as_ref(),
        );

        let mut quad = [TraversalDetails::default(); 4];
        for quadrant in order {
            let index = quadrant.index();
            quad[index] = self.visit_if_visible(&mut children[index], ancestor_meets_sse, fill_source)?;
        }
        Ok(TraversalDetails::combine(&quad))
    }

    fn render_tile(
        &mut self,
        tile: &mut QuadtreeTile<P::Data>,
        fill_source: Option<TileKey>,
        rendered_last_frame: bool,
    ) -> TraversalDetails {
        self.add_to_render_list(tile, fill_source);
        tile.set_selection_result(TileSelectionResult::Rendered, self.pass);
        TraversalDetails::for_rendered_tile(tile, rendered_last_frame)
    }

    fn add_to_render_list(&mut self, tile: &QuadtreeTile<P::Data>, fill_source: Option<TileKey>) {
        let fill = if tile.renderable { None } else { fill_source };
        if !tile.renderable && fill.is_none() {
            tracing::warn!("{} selected with no renderable ancestor to fill it", tile.key());
        }
        self.render_list.push(RenderEntry {
            key: tile.key(),
            fill,
        });
    }

    /// Mark everything rendered below `tile` since `first_rendered` as kicked,
    /// along with the refined tiles on the way down.
    fn kick_descendants(&mut self, tile: &mut QuadtreeTile<P::Data>, first_rendered: usize) {
        for entry in &self.render_list[first_rendered..] {
            tile.for_each_on_path_mut(&entry.key, &mut |work| {
                work.last_selection_result = work.last_selection_result.kick();
            });
        }
    }

    fn queue_tile_load(&mut self, priority: LoadPriority, tile: &mut QuadtreeTile<P::Data>) {
        if !tile.needs_loading() || tile.queued_pass == Some(self.pass) {
            return;
        }
        let load_priority = self.provider.compute_tile_load_priority(tile, self.frame_state);
        tile.queued_pass = Some(self.pass);
        self.queues.push(priority, tile.key(), load_priority);
    }

    fn contains_needed_position(&self, tile: &QuadtreeTile<P::Data>) -> bool {
        let rectangle = tile.rectangle();
        self.frame_state
            .camera_position
            .is_some_and(|position| rectangle.contains(&position))
            || self
                .frame_state
                .camera_reference_frame_origin
                .is_some_and(|origin| rectangle.contains(&origin))
    }
}
