//! Tile coordinates → camera pose.

use serde::{Deserialize, Serialize};

use super::{CameraPose, DepthOfField, ProjectionMode};
use crate::scene::ChunkPos;
use crate::util::{mat3_from_rows, DMat3, DVec3, Error, Result, Transform3};

/// Map units per tile edge at zoom-out level 0, before dividing by scale.
pub const TILE_UNIT: f64 = 64.0;

/// Map-space height the camera plane sits at.
pub const FIXED_HEIGHT: f64 = 65.0;

/// Edge length of a tile image in pixels at boost level 0.
pub const TILE_SIZE: u32 = 128;

/// Blocks per chunk edge.
const CHUNK_SIZE: f64 = 16.0;

/// Perspective parameters shared by every tile of a map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionParams {
    /// Degrees; 180 looks north.
    pub azimuth: f64,
    /// Degrees above the horizon; 90 is top-down.
    pub inclination: f64,
    pub model_scale: f64,
    /// Pixels per block.
    pub scale: f64,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            azimuth: 135.0,
            inclination: 60.0,
            model_scale: 1.0,
            scale: 4.0,
        }
    }
}

/// Precomputed map-to-world transform for one perspective.
#[derive(Debug, Clone)]
pub struct CameraProjector {
    params: ProjectionParams,
    map_to_world: Transform3,
}

impl CameraProjector {
    /// Compose the map-to-world transform.
    ///
    /// Fails if `scale` or `model_scale` is not positive or the inclination
    /// is a multiple of 180°.
    pub fn new(params: ProjectionParams) -> Result<Self> {
        if !(params.scale > 0.0 && params.scale.is_finite()) {
            return Err(Error::InvalidProjection(format!("scale must be > 0, got {}", params.scale)));
        }
        if !(params.model_scale > 0.0 && params.model_scale.is_finite()) {
            return Err(Error::InvalidProjection(format!(
                "model scale must be > 0, got {}",
                params.model_scale
            )));
        }
        let sin_inclination = params.inclination.to_radians().sin();
        if !params.inclination.is_finite() || params.inclination.rem_euclid(180.0) == 0.0 {
            return Err(Error::InvalidProjection(format!(
                "inclination {}° is a multiple of 180°",
                params.inclination
            )));
        }

        let mut map_to_world = Transform3::identity();
        map_to_world
            .scale(1.0 / params.model_scale, 1.0 / params.model_scale, 1.0 / sin_inclination)
            .shear_z(0.0, -(90.0 - params.inclination).to_radians().tan())
            .rotate_yz(-(90.0 - params.inclination))
            .rotate_xy(params.azimuth - 180.0)
            .multiply(coordinate_swap());

        Ok(Self { params, map_to_world })
    }

    /// Projection parameters.
    pub fn params(&self) -> &ProjectionParams {
        &self.params
    }

    /// Composed map-to-world matrix.
    pub fn map_to_world(&self) -> DMat3 {
        self.map_to_world.matrix()
    }

    /// Camera pose for a tile.
    ///
    /// `extra_zoom_out` is accepted for parity with the host's tile
    /// addressing; the pose only depends on `map_zoom_out`.
    pub fn compute_camera(
        &self,
        tx: i32,
        ty: i32,
        map_zoom_out: u32,
        _extra_zoom_out: u32,
    ) -> CameraPose {
        let step = f64::from(1u32 << map_zoom_out.min(30)) * TILE_UNIT / self.params.scale;
        let map_point = DVec3::new(
            (f64::from(tx) + 0.5) * step,
            (f64::from(ty) + 0.5) * step,
            FIXED_HEIGHT,
        );
        CameraPose {
            position: self.map_to_world.transform(map_point),
            yaw: (90.0 - self.params.azimuth + 90.0) / 180.0 * std::f64::consts::PI,
            pitch: (-90.0 + self.params.inclination) / 180.0 * std::f64::consts::PI,
            fov: 128.0 / self.params.scale,
            projection: ProjectionMode::Orthographic,
            depth_of_field: DepthOfField::Infinite,
        }
    }

    /// Chunks whose columns are visible from a tile between two heights,
    /// expanded by `padding` chunks on every side. Sorted, no duplicates.
    pub fn required_chunks(
        &self,
        tx: i32,
        ty: i32,
        map_zoom_out: u32,
        y_min: i32,
        y_max: i32,
        padding: u32,
    ) -> Vec<ChunkPos> {
        let pose = self.compute_camera(tx, ty, map_zoom_out, 0);
        visible_chunks(&pose, 1.0, y_min, y_max, padding)
    }
}

/// Chunks covered by an orthographic view between two heights.
///
/// `aspect` is width / height of the canvas.
pub fn visible_chunks(
    pose: &CameraPose,
    aspect: f64,
    y_min: i32,
    y_max: i32,
    padding: u32,
) -> Vec<ChunkPos> {
    let forward = pose.forward();
    let (right, up) = pose.image_axes();
    let half_w = pose.fov * 0.5 * aspect;
    let half_h = pose.fov * 0.5;

    let mut min = DVec3::splat(f64::INFINITY);
    let mut max = DVec3::splat(f64::NEG_INFINITY);
    for (sx, sy) in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
        let corner = pose.position + right * (sx * half_w) + up * (sy * half_h);
        for height in [f64::from(y_min), f64::from(y_max) + 1.0] {
            let p = if forward.y.abs() > 1e-9 {
                corner + forward * ((height - corner.y) / forward.y)
            } else {
                corner
            };
            min = min.min(p);
            max = max.max(p);
        }
    }

    let pad = i32::try_from(padding).unwrap_or(i32::MAX / 2);
    let cx0 = (min.x / CHUNK_SIZE).floor() as i32 - pad;
    let cx1 = (max.x / CHUNK_SIZE).floor() as i32 + pad;
    let cz0 = (min.z / CHUNK_SIZE).floor() as i32 - pad;
    let cz1 = (max.z / CHUNK_SIZE).floor() as i32 + pad;

    let mut chunks = Vec::with_capacity(((cx1 - cx0 + 1) * (cz1 - cz0 + 1)).max(0) as usize);
    for x in cx0..=cx1 {
        for z in cz0..=cz1 {
            chunks.push(ChunkPos::new(x, z));
        }
    }
    chunks
}

/// Map axes to world axes (x, y up, z).
fn coordinate_swap() -> DMat3 {
    mat3_from_rows([
        [0.0, -1.0, 0.0],
        [0.0, 0.0, 1.0],
        [-1.0, 0.0, 0.0],
    ])
}

/// Camera pose for a tile with the given projection parameters.
pub fn compute_camera(
    tx: i32,
    ty: i32,
    map_zoom_out: u32,
    extra_zoom_out: u32,
    params: ProjectionParams,
) -> Result<CameraPose> {
    Ok(CameraProjector::new(params)?.compute_camera(tx, ty, map_zoom_out, extra_zoom_out))
}
