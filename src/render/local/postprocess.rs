//! Exposure and tone mapping.

use crate::scene::{Postprocess, SceneSettings};

const GAMMA: f32 = 2.2;

/// Maps linear radiance to display values in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessor {
    pub exposure: f32,
    pub mode: Postprocess,
}

impl PostProcessor {
    pub fn new(exposure: f32, mode: Postprocess) -> Self {
        Self { exposure, mode }
    }

    pub fn from_settings(settings: &SceneSettings) -> Self {
        Self::new(settings.exposure as f32, settings.postprocess)
    }

    /// Map one channel.
    #[inline]
    pub fn map(&self, v: f32) -> f32 {
        let v = (v * self.exposure).max(0.0);
        let out = match self.mode {
            Postprocess::None => v,
            Postprocess::Gamma => v.powf(1.0 / GAMMA),
            Postprocess::Tonemap1 => {
                // Hejl-Burgess-Dawson, gamma is baked in
                let x = (v - 0.004).max(0.0);
                (x * (6.2 * x + 0.5)) / (x * (6.2 * x + 1.7) + 0.06)
            }
            Postprocess::Aces => {
                let x = (v * (2.51 * v + 0.03)) / (v * (2.43 * v + 0.59) + 0.14);
                x.max(0.0).powf(1.0 / GAMMA)
            }
            Postprocess::Hable => {
                const WHITE: f32 = 11.2;
                let x = hable(v * 2.0) / hable(WHITE);
                x.max(0.0).powf(1.0 / GAMMA)
            }
        };
        out.clamp(0.0, 1.0)
    }

    /// Map every channel of an RGB buffer in place.
    pub fn apply_buffer(&self, rgb: &mut [f32]) {
        for v in rgb {
            *v = self.map(*v);
        }
    }
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self::new(1.0, Postprocess::Gamma)
    }
}

#[inline]
fn hable(x: f32) -> f32 {
    const A: f32 = 0.15;
    const B: f32 = 0.50;
    const C: f32 = 0.10;
    const D: f32 = 0.20;
    const E: f32 = 0.02;
    const F: f32 = 0.30;
    ((x * (A * x + C * B) + D * E) / (x * (A * x + B) + D * F)) - E / F
}
