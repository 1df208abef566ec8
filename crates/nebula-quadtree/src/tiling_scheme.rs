//! Geographic tiling scheme: maps `(x, y, level)` tile coordinates to rectangles.

use std::f64::consts::TAU;

use crate::{Cartographic, Rectangle};

/// Geometric error of a level-zero heightmap tile, in metres.
///
/// Standard heuristic: a quarter of the circumference spread over the samples
/// of one tile row at level zero. Each finer level halves it.
#[must_use]
pub fn estimated_level_zero_geometric_error(
    radius: f64,
    tile_image_width: u32,
    level_zero_tiles_x: u32,
) -> f64 {
    radius * TAU * 0.25 / (f64::from(tile_image_width) * f64::from(level_zero_tiles_x))
}

/// Equirectangular tiling of a [`Rectangle`].
///
/// Tile `y` grows southward from the rectangle's north edge.
#[derive(Clone, Debug, PartialEq)]
pub struct TilingScheme {
    rectangle: Rectangle,
    level_zero_tiles_x: u32,
    level_zero_tiles_y: u32,
}

impl Default for TilingScheme {
    fn default() -> Self {
        Self::geographic()
    }
}

impl TilingScheme {
    /// The whole globe split into two level-zero tiles (west and east hemispheres).
    #[must_use]
    pub fn geographic() -> Self {
        Self::new(Rectangle::MAX_VALUE, 2, 1)
    }

    /// Create a scheme over `rectangle` with the given number of root tiles.
    #[must_use]
    pub fn new(rectangle: Rectangle, level_zero_tiles_x: u32, level_zero_tiles_y: u32) -> Self {
        Self {
            rectangle,
            level_zero_tiles_x,
            level_zero_tiles_y,
        }
    }

    pub fn rectangle(&self) -> &Rectangle {
        &self.rectangle
    }

    pub fn number_of_x_tiles_at_level(&self, level: u32) -> u32 {
        self.level_zero_tiles_x << level
    }

    pub fn number_of_y_tiles_at_level(&self, level: u32) -> u32 {
        self.level_zero_tiles_y << level
    }

    /// Number of level-zero (root) tiles.
    pub fn root_tile_count(&self) -> usize {
        (self.level_zero_tiles_x as usize) * (self.level_zero_tiles_y as usize)
    }

    /// Geographic bounds of tile `(x, y)` at `level`.
    #[must_use]
    pub fn tile_xy_to_rectangle(&self, x: u32, y: u32, level: u32) -> Rectangle {
        let tile_width = self.rectangle.width() / f64::from(self.number_of_x_tiles_at_level(level));
        let tile_height =
            self.rectangle.height() / f64::from(self.number_of_y_tiles_at_level(level));

        let west = self.rectangle.west + f64::from(x) * tile_width;
        let east = self.rectangle.west + f64::from(x + 1) * tile_width;
        let north = self.rectangle.north - f64::from(y) * tile_height;
        let south = self.rectangle.north - f64::from(y + 1) * tile_height;
        Rectangle::new(west, south, east, north)
    }

    /// Tile coordinates containing `position` at `level`, or `None` if outside the scheme.
    #[must_use]
    pub fn position_to_tile_xy(&self, position: &Cartographic, level: u32) -> Option<(u32, u32)> {
        if !self.rectangle.contains(position) {
            return None;
        }
        let x_tiles = self.number_of_x_tiles_at_level(level);
        let y_tiles = self.number_of_y_tiles_at_level(level);
        let tile_width = self.rectangle.width() / f64::from(x_tiles);
        let tile_height = self.rectangle.height() / f64::from(y_tiles);

        let mut longitude = position.longitude;
        if self.rectangle.east < self.rectangle.west && longitude < self.rectangle.west {
            longitude += TAU;
        }

        let x = (((longitude - self.rectangle.west) / tile_width) as u32).min(x_tiles - 1);
        let y = (((self.rectangle.north - position.latitude) / tile_height) as u32).min(y_tiles - 1);
        Some((x, y))
    }
}
