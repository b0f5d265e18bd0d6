//! Scene description handed to a render backend.
//!
//! A [`SceneDescription`] is built fresh for every tile by the pipeline's
//! initialization callback and discarded once the image is committed.
//!
//! - [`world`] - world references, chunk and region addressing
//! - [`geometry`] - block geometry and materials
//! - [`codec`] - binary geometry payload for the render farm
//! - [`settings`] - render settings and template scenes
//! - [`provider`] - [`GeometryProvider`] seam to the world loader

pub mod codec;
pub mod geometry;
pub mod provider;
pub mod settings;
pub mod world;

pub use codec::{decode_geometry, encode_geometry};
pub use geometry::{Block, Geometry, Material};
pub use provider::{GeometryProvider, StaticGeometryProvider};
pub use settings::{Postprocess, SceneSettings, Sun, TemplateScene};
pub use world::{ChunkPos, Dimension, RegionPos, WorldRef, CHUNK_SIZE, REGION_CHUNKS};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::camera::CameraPose;
use crate::util::{Error, Result};

/// Mutable per-render state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescription {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub camera: CameraPose,
    /// Lowest rendered block layer.
    pub y_clip_min: i32,
    /// Highest rendered block layer, inclusive.
    pub y_clip_max: i32,
    pub target_spp: u32,
    /// Sky rays produce transparent pixels.
    pub transparent_sky: bool,
    pub settings: SceneSettings,
    pub world: Option<WorldRef>,
    /// Chunks the geometry was loaded from.
    pub chunks: Vec<ChunkPos>,
    /// Loaded blocks; uploaded separately from the JSON descriptor.
    #[serde(skip)]
    pub geometry: Geometry,
}

impl Default for SceneDescription {
    fn default() -> Self {
        Self {
            name: "scene".into(),
            width: 400,
            height: 400,
            camera: CameraPose::default(),
            y_clip_min: -64,
            y_clip_max: 319,
            target_spp: 100,
            transparent_sky: false,
            settings: SceneSettings::default(),
            world: None,
            chunks: Vec::new(),
            geometry: Geometry::new(),
        }
    }
}

impl SceneDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canvas size as (width, height).
    #[inline]
    pub fn canvas(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn set_canvas_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Take over the settings of a template scene.
    pub fn apply_template(&mut self, template: &TemplateScene) {
        self.settings = template.settings().clone();
    }

    /// Check the scene can be rendered; failures are configuration errors.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::config(format!("empty canvas {}x{}", self.width, self.height)));
        }
        if self.target_spp == 0 {
            return Err(Error::config("target samples per pixel must be > 0"));
        }
        if self.y_clip_min > self.y_clip_max {
            return Err(Error::config(format!(
                "y clip {}..{} is empty",
                self.y_clip_min, self.y_clip_max
            )));
        }
        Ok(())
    }

    /// JSON scene descriptor as uploaded to the render farm.
    pub fn to_json(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert("spp".into(), Value::from(0));
            map.insert("renderTime".into(), Value::from(0));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_descriptor() {
        let mut scene = SceneDescription::new();
        scene.name = "3_-2".into();
        scene.target_spp = 100;
        scene.geometry.add_material(Material::new("stone", [0.5; 3]));

        let json = scene.to_json().unwrap();
        assert_eq!(json["name"], "3_-2");
        assert_eq!(json["targetSpp"], 100);
        assert_eq!(json["spp"], 0);
        assert!(json.get("geometry").is_none());
        assert_eq!(json["camera"]["projection"], "orthographic");
    }

    #[test]
    fn test_apply_template() {
        let template = TemplateScene::from_json(r#"{"settings": {"exposure": 2.0}}"#).unwrap();
        let mut scene = SceneDescription::new();
        scene.apply_template(&template);
        assert_eq!(scene.settings.exposure, 2.0);
    }

    #[test]
    fn test_validate() {
        let mut scene = SceneDescription::new();
        assert!(scene.validate().is_ok());
        scene.set_canvas_size(0, 128);
        assert!(scene.validate().is_err_and(|e| !e.is_retryable()));
        scene.set_canvas_size(128, 128);
        scene.y_clip_min = 10;
        scene.y_clip_max = 5;
        assert!(scene.validate().is_err_and(|e| !e.is_retryable()));
    }
}
