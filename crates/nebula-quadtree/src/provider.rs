//! The tile provider contract: everything the quadtree needs from the
//! subsystem that owns tile geometry, visibility math and drawing.

use crate::error::TileProviderError;
use crate::{Cartographic, QuadtreeTile, TileKey, TilingScheme};

/// Per-frame camera and viewport context handed to the provider.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameState {
    /// Monotonic frame counter, owned by the caller.
    pub frame_number: u64,
    /// Camera position, if known.
    pub camera_position: Option<Cartographic>,
    /// Origin of the camera's reference frame, if it differs from the globe centre.
    pub camera_reference_frame_origin: Option<Cartographic>,
    /// Drawing buffer height in pixels.
    pub drawing_buffer_height: f64,
    /// Projection term of the screen-space error, `2 * tan(fovy / 2)` for perspective.
    pub sse_denominator: f64,
    /// Device pixel ratio; screen-space error is divided by it.
    pub pixel_ratio: f64,
    /// Atmospheric fog, which lowers the error of distant tiles.
    pub fog: Option<FogState>,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            frame_number: 0,
            camera_position: None,
            camera_reference_frame_origin: None,
            drawing_buffer_height: 1000.0,
            sse_denominator: 2.0 * (60f64.to_radians() * 0.5).tan(),
            pixel_ratio: 1.0,
            fog: None,
        }
    }
}

/// Fog parameters used by the screen-space error computation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FogState {
    pub density: f64,
    /// Screen-space error subtracted at full fog.
    pub sse: f64,
}

impl FogState {
    /// Fraction of full fog at `distance`: `1 - exp(-(distance * density)^2)`.
    #[must_use]
    pub fn factor(&self, distance: f64) -> f64 {
        let scalar = distance * self.density;
        1.0 - (-(scalar * scalar)).exp()
    }
}

/// Result of culling a tile against the view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Outside,
    Intersecting,
    Inside,
}

/// Whether a tile is known, in advance of loading it, to have data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileAvailability {
    Available,
    Unavailable,
    Unknown,
}

/// Provider-owned tile payload as seen by the quadtree.
pub trait TileData {
    /// Whether the payload carries geometry that can be drawn and picked.
    fn has_geometry(&self) -> bool {
        true
    }

    /// Sample the surface at `position`, returning the clamped position.
    fn pick(&self, position: &Cartographic) -> Option<Cartographic>;
}

/// The source of tiles driven by a [`QuadtreePrimitive`](crate::QuadtreePrimitive).
///
/// Only `load_tile` may change a tile's `state`, `renderable`,
/// `upsampled_from_parent` or `data`.
pub trait TileProvider {
    type Data: TileData;

    fn tiling_scheme(&self) -> &TilingScheme;

    /// Whether selection may run at all. Nothing is selected while false.
    fn ready(&self) -> bool {
        true
    }

    /// Called once, before the first frame.
    fn initialize(&mut self, _frame_state: &FrameState) {}

    /// Called from [`QuadtreePrimitive::update`](crate::QuadtreePrimitive::update).
    fn update(&mut self, _frame_state: &FrameState) {}

    /// Brackets a selection pass together with [`TileProvider::end_update`].
    fn begin_update(&mut self, _frame_state: &FrameState) {}

    fn end_update(&mut self, _frame_state: &FrameState) {}

    /// Maximum geometric error in metres of any tile at `level`.
    fn level_maximum_geometric_error(&self, level: u32) -> f64;

    fn compute_tile_visibility(
        &mut self,
        tile: &QuadtreeTile<Self::Data>,
        frame_state: &FrameState,
    ) -> Result<Visibility, TileProviderError>;

    fn compute_distance_to_tile(
        &mut self,
        tile: &QuadtreeTile<Self::Data>,
        frame_state: &FrameState,
    ) -> Result<f64, TileProviderError>;

    /// Advance loading of `tile` by one step.
    fn load_tile(&mut self, frame_state: &FrameState, tile: &mut QuadtreeTile<Self::Data>);

    /// Submit `tile` for drawing this frame. `fill` is the renderable ancestor
    /// whose content stands in for `tile` when `tile` is not renderable itself.
    fn show_tile_this_frame(
        &mut self,
        tile: &QuadtreeTile<Self::Data>,
        fill: Option<&QuadtreeTile<Self::Data>>,
        frame_state: &FrameState,
    );

    /// Availability of `key` known before requesting it.
    fn tile_availability(&self, _key: TileKey) -> TileAvailability {
        TileAvailability::Unknown
    }

    /// Whether refining `tile` into its children is possible now.
    ///
    /// True once the tile is renderable, or as soon as availability of its
    /// children is known so that levels can be skipped.
    fn can_refine(&self, tile: &QuadtreeTile<Self::Data>) -> bool {
        tile.renderable
            || self.tile_availability(tile.key().children()[2]) != TileAvailability::Unknown
    }

    /// Whether rendering `tile` this frame keeps every detail rendered last frame.
    fn can_render_without_losing_detail(&self, _tile: &QuadtreeTile<Self::Data>) -> bool {
        false
    }

    /// Sort key within a load queue; lower loads first. `None` keeps traversal order.
    fn compute_tile_load_priority(
        &self,
        _tile: &QuadtreeTile<Self::Data>,
        _frame_state: &FrameState,
    ) -> Option<f64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sse_denominator_matches_sixty_degree_fov() {
        let frame_state = FrameState::default();
        assert!((frame_state.sse_denominator - 1.154_700_538).abs() < 1e-6);
        assert!(frame_state.fog.is_none());
    }

    #[test]
    fn test_fog_factor_grows_with_distance() {
        let fog = FogState {
            density: 1e-4,
            sse: 2.0,
        };
        assert_eq!(fog.factor(0.0), 0.0);
        let near = fog.factor(1_000.0);
        let far = fog.factor(20_000.0);
        assert!(near < far, "fog should thicken with distance");
        assert!(far <= 1.0);
    }
}
