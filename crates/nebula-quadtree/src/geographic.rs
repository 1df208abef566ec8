//! Geographic positions and rectangles in radians.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// A position on the globe: longitude and latitude in radians, height in metres.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Cartographic {
    /// Longitude in radians, in `[-π, π]`.
    pub longitude: f64,
    /// Latitude in radians, in `[-π/2, π/2]`.
    pub latitude: f64,
    /// Height above the reference surface in metres.
    pub height: f64,
}

impl Cartographic {
    /// Create a position from radians and a height in metres.
    #[must_use]
    pub const fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            height,
        }
    }

    /// Create a position from degrees and a height in metres.
    #[must_use]
    pub fn from_degrees(longitude: f64, latitude: f64, height: f64) -> Self {
        Self::new(longitude.to_radians(), latitude.to_radians(), height)
    }

    /// Same longitude and latitude, different height.
    #[must_use]
    pub fn with_height(self, height: f64) -> Self {
        Self { height, ..self }
    }

    /// Great-circle angle between two positions in radians (haversine).
    #[must_use]
    pub fn angular_distance(&self, other: &Cartographic) -> f64 {
        let d_lat = other.latitude - self.latitude;
        let d_lon = other.longitude - self.longitude;
        let a = (d_lat * 0.5).sin().powi(2)
            + self.latitude.cos() * other.latitude.cos() * (d_lon * 0.5).sin().powi(2);
        2.0 * a.sqrt().min(1.0).asin()
    }
}

/// A geographic rectangle. `east < west` means the rectangle crosses the antimeridian.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rectangle {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Rectangle {
    /// The whole globe.
    pub const MAX_VALUE: Rectangle = Rectangle {
        west: -PI,
        south: -FRAC_PI_2,
        east: PI,
        north: FRAC_PI_2,
    };

    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    #[must_use]
    pub fn from_degrees(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self::new(
            west.to_radians(),
            south.to_radians(),
            east.to_radians(),
            north.to_radians(),
        )
    }

    /// Longitudinal extent in radians, accounting for antimeridian crossing.
    #[must_use]
    pub fn width(&self) -> f64 {
        if self.east < self.west {
            self.east + TAU - self.west
        } else {
            self.east - self.west
        }
    }

    /// Latitudinal extent in radians.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Centre of the rectangle at zero height.
    #[must_use]
    pub fn center(&self) -> Cartographic {
        let mut longitude = self.west + self.width() * 0.5;
        if longitude > PI {
            longitude -= TAU;
        }
        Cartographic::new(longitude, (self.south + self.north) * 0.5, 0.0)
    }

    /// Edge-inclusive containment test.
    #[must_use]
    pub fn contains(&self, position: &Cartographic) -> bool {
        let mut longitude = position.longitude;
        let latitude = position.latitude;

        let mut east = self.east;
        if east < self.west {
            east += TAU;
            if longitude < 0.0 {
                longitude += TAU;
            }
        }
        longitude >= self.west
            && longitude <= east
            && latitude >= self.south
            && latitude <= self.north
    }

    /// Clamp a position into the rectangle (ignoring antimeridian wrap for the clamp).
    #[must_use]
    pub fn closest_point(&self, position: &Cartographic) -> Cartographic {
        if self.contains(position) {
            return position.with_height(0.0);
        }
        let longitude = if self.east < self.west {
            // Pick whichever edge is angularly closer.
            let to_west = (position.longitude - self.west).abs();
            let to_east = (position.longitude - self.east).abs();
            if to_west < to_east { self.west } else { self.east }
        } else {
            position.longitude.clamp(self.west, self.east)
        };
        Cartographic::new(longitude, position.latitude.clamp(self.south, self.north), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_value_contains_everything() {
        for (lon, lat) in [(-180.0, -90.0), (0.0, 0.0), (180.0, 90.0), (-72.0, 40.0)] {
            assert!(Rectangle::MAX_VALUE.contains(&Cartographic::from_degrees(lon, lat, 0.0)));
        }
    }

    #[test]
    fn test_contains_is_edge_inclusive() {
        let rect = Rectangle::from_degrees(0.0, 0.0, 10.0, 10.0);
        assert!(rect.contains(&Cartographic::from_degrees(0.0, 0.0, 0.0)));
        assert!(rect.contains(&Cartographic::from_degrees(10.0, 10.0, 0.0)));
        assert!(!rect.contains(&Cartographic::from_degrees(10.5, 5.0, 0.0)));
        assert!(!rect.contains(&Cartographic::from_degrees(5.0, -0.5, 0.0)));
    }

    #[test]
    fn test_antimeridian_rectangle() {
        let rect = Rectangle::from_degrees(170.0, -10.0, -170.0, 10.0);
        assert!((rect.width() - 20f64.to_radians()).abs() < 1e-12);
        assert!(rect.contains(&Cartographic::from_degrees(179.0, 0.0, 0.0)));
        assert!(rect.contains(&Cartographic::from_degrees(-175.0, 0.0, 0.0)));
        assert!(!rect.contains(&Cartographic::from_degrees(0.0, 0.0, 0.0)));
        let center = rect.center();
        assert!((center.longitude.abs() - PI).abs() < 1e-12);
    }

    #[test]
    fn test_center() {
        let rect = Rectangle::from_degrees(-180.0, -90.0, 0.0, 90.0);
        let center = rect.center();
        assert!((center.longitude - (-90f64).to_radians()).abs() < 1e-12);
        assert!(center.latitude.abs() < 1e-12);
    }

    #[test]
    fn test_closest_point_clamps_outside_positions() {
        let rect = Rectangle::from_degrees(0.0, 0.0, 10.0, 10.0);
        let p = rect.closest_point(&Cartographic::from_degrees(20.0, -5.0, 100.0));
        assert!((p.longitude - 10f64.to_radians()).abs() < 1e-12);
        assert!(p.latitude.abs() < 1e-12);
        assert_eq!(p.height, 0.0);
    }

    #[test]
    fn test_angular_distance() {
        let a = Cartographic::from_degrees(0.0, 0.0, 0.0);
        let b = Cartographic::from_degrees(90.0, 0.0, 0.0);
        assert!((a.angular_distance(&b) - FRAC_PI_2).abs() < 1e-12);
        assert!(a.angular_distance(&a).abs() < 1e-12);
    }
}
