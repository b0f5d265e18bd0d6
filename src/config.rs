//! Per-map configuration.
//!
//! A map is configured by one JSON file; every key is optional.
//!
//! ```json
//! {
//!   "name": "surface",
//!   "samples_per_pixel": 100,
//!   "denoiser": { "enabled": true },
//!   "perspective": { "id": "iso_SE_60", "azimuth": 135, "inclination": 60, "scale": 4 },
//!   "render_farm": { "enabled": false }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::camera::{CameraProjector, ProjectionParams};
use crate::render::local::{DenoiseOptions, LocalOptions, LocalPathTracer};
use crate::render::remote::{RemoteJobRenderer, RemoteOptions, UploadStrategy};
use crate::render::{RenderBackend, TextureSet};
use crate::scene::{Dimension, TemplateScene};
use crate::tiles::TileSettings;
use crate::util::{Error, Result};

/// Camera perspective of a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerspectiveConfig {
    pub id: String,
    pub azimuth: f64,
    pub inclination: f64,
    pub scale: f64,
    pub model_scale: f64,
    pub min_height: Option<i32>,
    pub max_height: Option<i32>,
}

impl Default for PerspectiveConfig {
    fn default() -> Self {
        let params = ProjectionParams::default();
        Self {
            id: "default".into(),
            azimuth: params.azimuth,
            inclination: params.inclination,
            scale: params.scale,
            model_scale: params.model_scale,
            min_height: None,
            max_height: None,
        }
    }
}

impl PerspectiveConfig {
    pub fn params(&self) -> ProjectionParams {
        ProjectionParams {
            azimuth: self.azimuth,
            inclination: self.inclination,
            model_scale: self.model_scale,
            scale: self.scale,
        }
    }
}

/// Render farm access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderFarmConfig {
    pub enabled: bool,
    pub api_url: String,
    pub api_key: String,
    pub upload: UploadStrategy,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
    pub skymap: Option<PathBuf>,
}

impl Default for RenderFarmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.chunkycloud.lemaik.de".into(),
            api_key: String::new(),
            upload: UploadStrategy::Incremental,
            poll_interval_ms: 1000,
            timeout_secs: 3600,
            skymap: None,
        }
    }
}

/// Settings of one map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Map name, used in tile paths.
    pub name: String,
    pub world: String,
    pub dimension: Dimension,
    pub samples_per_pixel: u32,
    pub denoiser: DenoiseOptions,
    pub threads: usize,
    /// Percent, clamped to 0..=100.
    pub cpu_load: u32,
    pub chunk_padding: u32,
    pub requeue_failed_tiles: bool,
    pub max_requeue_attempts: u32,
    pub texturepack: Option<PathBuf>,
    pub default_texturepack: Option<PathBuf>,
    pub template_scene: Option<PathBuf>,
    pub boost_zoom: u32,
    pub map_zoom_out: u32,
    pub perspective: PerspectiveConfig,
    pub render_farm: RenderFarmConfig,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            name: "map".into(),
            world: "world".into(),
            dimension: Dimension::Overworld,
            samples_per_pixel: 100,
            denoiser: DenoiseOptions::default(),
            threads: 2,
            cpu_load: 100,
            chunk_padding: 0,
            requeue_failed_tiles: true,
            max_requeue_attempts: 3,
            texturepack: None,
            default_texturepack: None,
            template_scene: None,
            boost_zoom: 0,
            map_zoom_out: 0,
            perspective: PerspectiveConfig::default(),
            render_farm: RenderFarmConfig::default(),
        }
    }
}

impl MapConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&text).map_err(|e| Error::config(format!("{}: {e}", path.display())))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        if config.render_farm.enabled && config.render_farm.api_key.is_empty() {
            warn!(map = %config.name, "render farm enabled without an API key");
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn local_options(&self) -> LocalOptions {
        LocalOptions {
            threads: self.threads,
            cpu_load: self.cpu_load.min(100) as u8,
            denoise: self.denoiser,
            ..Default::default()
        }
    }

    pub fn remote_options(&self) -> RemoteOptions {
        RemoteOptions {
            upload: self.render_farm.upload,
            poll_interval: Duration::from_millis(self.render_farm.poll_interval_ms.max(1)),
            timeout: Duration::from_secs(self.render_farm.timeout_secs),
            skymap: self.render_farm.skymap.clone(),
        }
    }

    /// Validated projector for the configured perspective.
    pub fn projector(&self) -> Result<CameraProjector> {
        CameraProjector::new(self.perspective.params())
    }

    pub fn tile_settings(&self) -> TileSettings {
        TileSettings {
            perspective: self.perspective.id.clone(),
            boost: self.boost_zoom,
            map_zoom_out: self.map_zoom_out,
            chunk_padding: self.chunk_padding,
            target_spp: self.samples_per_pixel,
            min_height: self.perspective.min_height,
            max_height: self.perspective.max_height,
        }
    }

    pub fn texture_set(&self) -> TextureSet {
        self.texturepack.clone().map_or_else(TextureSet::none, TextureSet::single)
    }

    /// Template scene, if one is configured.
    pub fn load_template(&self) -> Result<Option<TemplateScene>> {
        self.template_scene.as_deref().map(TemplateScene::load).transpose()
    }

    /// Local path tracer, or the render farm when enabled.
    pub fn build_backend(&self) -> Result<Arc<dyn RenderBackend>> {
        let backend: Arc<dyn RenderBackend> = if self.render_farm.enabled {
            info!(map = %self.name, url = %self.render_farm.api_url, "using render farm");
            Arc::new(RemoteJobRenderer::connect(
                &self.render_farm.api_url,
                &self.render_farm.api_key,
                self.remote_options(),
            )?)
        } else {
            info!(map = %self.name, threads = self.threads, "using local path tracer");
            Arc::new(LocalPathTracer::new(self.local_options())?)
        };
        backend.set_default_texturepack(self.default_texturepack.clone());
        Ok(backend)
    }
}
