//! Sample accumulation.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use super::postprocess::PostProcessor;

/// Per-pixel running sums of one pass, row-major.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    width: usize,
    height: usize,
    /// RGB triples.
    sums: Vec<f64>,
    alpha: Vec<f64>,
    spp: u32,
}

impl SampleBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            sums: vec![0.0; width * height * 3],
            alpha: vec![0.0; width * height],
            spp: 0,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Samples accumulated per pixel.
    #[inline]
    pub fn spp(&self) -> u32 {
        self.spp
    }

    /// Add one sample to every pixel.
    ///
    /// `sample(x, y)` runs in parallel over rows and returns RGBA.
    pub fn add_frame<F>(&mut self, sample: F)
    where
        F: Fn(usize, usize) -> [f32; 4] + Sync,
    {
        let width = self.width;
        self.sums
            .par_chunks_mut(width * 3)
            .zip(self.alpha.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (sums, alpha))| {
                for x in 0..width {
                    let s = sample(x, y);
                    sums[x * 3] += f64::from(s[0]);
                    sums[x * 3 + 1] += f64::from(s[1]);
                    sums[x * 3 + 2] += f64::from(s[2]);
                    alpha[x] += f64::from(s[3]);
                }
            });
        self.spp += 1;
    }

    /// Mean radiance per pixel as RGB triples (`Σ samples / N`).
    pub fn radiance(&self) -> Vec<f32> {
        let n = f64::from(self.spp.max(1));
        self.sums.iter().map(|s| (s / n) as f32).collect()
    }

    /// Mean coverage per pixel.
    pub fn alpha(&self) -> Vec<f32> {
        let n = f64::from(self.spp.max(1));
        self.alpha.iter().map(|a| (a / n) as f32).collect()
    }

    /// Tone-map and quantize.
    pub fn finalize(&self, post: &PostProcessor) -> RgbaImage {
        let mut rgb = self.radiance();
        post.apply_buffer(&mut rgb);
        to_rgba8(self.width, self.height, &rgb, &self.alpha())
    }
}

/// Quantize display-ready RGB in [0, 1] plus alpha into an image.
pub fn to_rgba8(width: usize, height: usize, rgb: &[f32], alpha: &[f32]) -> RgbaImage {
    let mut img = RgbaImage::new(width as u32, height as u32);
    for (i, px) in img.pixels_mut().enumerate() {
        *px = Rgba([
            quantize(rgb[i * 3]),
            quantize(rgb[i * 3 + 1]),
            quantize(rgb[i * 3 + 2]),
            quantize(alpha[i]),
        ]);
    }
    img
}

#[inline]
fn quantize(v: f32) -> u8 {
    if v.is_nan() {
        0
    } else {
        (v.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}
