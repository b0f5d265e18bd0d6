//! Camera poses and the map-to-world projection.
//!
//! A map tile is an isometric, orthographic view of the world. The
//! [`CameraProjector`] turns tile coordinates into a [`CameraPose`]; every
//! tile of one map shares orientation and field of view, only the position
//! changes.

mod projector;

pub use projector::*;

use serde::{Deserialize, Serialize};

use crate::util::DVec3;

/// Camera projection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMode {
    /// Parallel rays; `fov` is the visible width in blocks.
    #[default]
    Orthographic,
    /// Perspective rays; `fov` is the vertical field of view in degrees.
    Pinhole,
}

/// Depth of field setting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DepthOfField {
    /// Everything in focus.
    #[default]
    Infinite,
    /// Thin-lens aperture radius in blocks.
    Aperture(f64),
}

/// Camera placement and lens for one render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    /// World position (x, y up, z).
    pub position: DVec3,
    /// Heading in radians.
    pub yaw: f64,
    /// Radians; 0 looks straight down, -π/2 looks at the horizon.
    pub pitch: f64,
    pub fov: f64,
    pub projection: ProjectionMode,
    pub depth_of_field: DepthOfField,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: DVec3::new(0.0, 128.0, 0.0),
            yaw: 0.0,
            pitch: 0.0,
            fov: 32.0,
            projection: ProjectionMode::Orthographic,
            depth_of_field: DepthOfField::Infinite,
        }
    }
}

impl CameraPose {
    /// Direction rays travel.
    pub fn forward(&self) -> DVec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        DVec3::new(cy * sp, -cp, -sy * sp)
    }

    /// Image-space right and up axes in world space.
    ///
    /// `right × up == -forward`, so images are not mirrored.
    pub fn image_axes(&self) -> (DVec3, DVec3) {
        let (sy, cy) = self.yaw.sin_cos();
        let right = DVec3::new(-sy, 0.0, -cy);
        let up = right.cross(self.forward());
        (right, up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_straight_down() {
        let pose = CameraPose { pitch: 0.0, ..Default::default() };
        let f = pose.forward();
        assert!((f - DVec3::NEG_Y).length() < 1e-12);
    }

    #[test]
    fn test_axes_orthonormal() {
        let pose = CameraPose {
            yaw: 0.7,
            pitch: -0.5,
            ..Default::default()
        };
        let f = pose.forward();
        let (r, u) = pose.image_axes();
        assert!((f.length() - 1.0).abs() < 1e-12);
        assert!(r.dot(f).abs() < 1e-12);
        assert!(u.dot(f).abs() < 1e-12);
        assert!((r.cross(u) + f).length() < 1e-12);
        // looking down, image up points away from the ground
        assert!(u.y > 0.0);
    }
}
