//! Horizon culling against a spherical globe centred at the origin.
//!
//! A tile whose bounding sphere lies entirely behind the horizon, as seen
//! from the camera, cannot be visible and is culled before any finer test.

use glam::DVec3;

/// Horizon test state for one camera position.
#[derive(Clone, Debug)]
pub struct HorizonCuller {
    camera: DVec3,
    radius: f64,
    camera_distance: f64,
    /// Cosine of the angle, at the globe centre, between the camera and the horizon circle.
    cos_horizon: f64,
}

impl HorizonCuller {
    pub fn new(camera: DVec3, radius: f64) -> Self {
        let camera_distance = camera.length();
        let cos_horizon = if camera_distance > radius {
            radius / camera_distance
        } else {
            0.0
        };
        Self {
            camera,
            radius,
            camera_distance,
            cos_horizon,
        }
    }

    /// Whether any part of the sphere at `center` with radius `bounds` can be
    /// above the horizon.
    ///
    /// Widens the horizon cap by the angle the sphere subtends from the globe
    /// centre, so the test never culls a sphere that pokes over the edge.
    pub fn is_above_horizon(&self, center: DVec3, bounds: f64) -> bool {
        if self.camera_distance <= self.radius {
            return true;
        }
        let center_distance = center.length();
        if center_distance <= bounds || center_distance < 1e-10 {
            return true;
        }

        let cos_angle = center.dot(self.camera) / (center_distance * self.camera_distance);

        let sin_margin = bounds / center_distance;
        let cos_margin = (1.0 - sin_margin * sin_margin).max(0.0).sqrt();
        let sin_horizon = (1.0 - self.cos_horizon * self.cos_horizon).max(0.0).sqrt();

        // cos(horizon + margin)
        cos_angle >= self.cos_horizon * cos_margin - sin_horizon * sin_margin
    }

    /// Straight-line distance from the camera to the horizon.
    pub fn horizon_distance(&self) -> f64 {
        if self.camera_distance <= self.radius {
            return 0.0;
        }
        (self.camera_distance * self.camera_distance - self.radius * self.radius).sqrt()
    }

    pub fn camera_altitude(&self) -> f64 {
        (self.camera_distance - self.radius).max(0.0)
    }
}
