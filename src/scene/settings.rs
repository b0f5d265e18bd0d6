//! Render settings and template scenes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::util::{Error, Result};

/// Tone mapping applied to accumulated radiance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Postprocess {
    /// Clamp only.
    None,
    /// Gamma 2.2.
    #[default]
    Gamma,
    /// Filmic curve (Hejl-Burgess-Dawson).
    Tonemap1,
    /// ACES fitted curve.
    Aces,
    /// Uncharted 2 curve.
    Hable,
}

/// Sun light.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sun {
    /// Radians.
    pub azimuth: f64,
    /// Radians above the horizon.
    pub altitude: f64,
    pub intensity: f64,
    pub color: [f64; 3],
    pub enabled: bool,
}

impl Default for Sun {
    fn default() -> Self {
        Self {
            azimuth: std::f64::consts::FRAC_PI_2 / 3.0,
            altitude: std::f64::consts::FRAC_PI_3,
            intensity: 1.25,
            color: [1.0, 1.0, 1.0],
            enabled: true,
        }
    }
}

impl Sun {
    /// Unit vector pointing towards the sun.
    pub fn direction(&self) -> [f64; 3] {
        let (sa, ca) = self.azimuth.sin_cos();
        let (sh, ch) = self.altitude.sin_cos();
        [ca * ch, sh, sa * ch]
    }
}

/// Scene-wide render settings a template scene may override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    pub sun: Sun,
    /// Linear sky radiance.
    pub sky_color: [f64; 3],
    pub sky_intensity: f64,
    pub emitters_enabled: bool,
    pub emitter_intensity: f64,
    pub exposure: f64,
    /// Maximum path length in bounces.
    pub ray_depth: u32,
    pub postprocess: Postprocess,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            sun: Sun::default(),
            sky_color: [0.55, 0.7, 1.0],
            sky_intensity: 1.0,
            emitters_enabled: true,
            emitter_intensity: 13.0,
            exposure: 1.0,
            ray_depth: 5,
            postprocess: Postprocess::Gamma,
        }
    }
}

/// Keys of a saved scene that never carry over to tiles.
const STRIPPED_KEYS: &[&str] = &["world", "chunkList", "entities", "actors"];

/// Keys reset to zero before a template is applied.
const RESET_KEYS: &[&str] = &["spp", "renderTime"];

/// Settings shared by every tile of a map, read from a saved scene file.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateScene {
    settings: SceneSettings,
    /// Sanitized JSON the settings were read from.
    raw: Map<String, Value>,
}

impl TemplateScene {
    /// Read a template scene file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::TemplateScene(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Parse a template scene.
    ///
    /// World references, chunk lists and entities are removed; sample count
    /// and render time are reset.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::TemplateScene(format!("not valid JSON: {e}")))?;
        let Value::Object(mut raw) = value else {
            return Err(Error::TemplateScene("top level must be an object".into()));
        };
        for key in STRIPPED_KEYS {
            raw.remove(*key);
        }
        for key in RESET_KEYS {
            raw.insert((*key).to_string(), Value::from(0));
        }

        let settings = match raw.get("settings") {
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| Error::TemplateScene(format!("invalid settings: {e}")))?,
            None => SceneSettings::default(),
        };
        Ok(Self { settings, raw })
    }

    pub fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    /// Sanitized template JSON.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }
}
