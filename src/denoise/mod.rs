//! Denoising of low-sample renders.
//!
//! Buffers are pixel-major RGB triples of `width * height * 3` floats.
//! Beauty and albedo arrive clamped to [0, 1]; normals are unclamped
//! world-space vectors. Albedo is required whenever a normal buffer is
//! given.

mod bilateral;

pub use bilateral::GuidedBilateralDenoiser;

use crate::util::{Error, Result};

/// Edge-preserving filter over a beauty buffer.
pub trait Denoiser: Send + Sync {
    /// Filter `beauty`; guide buffers have already been validated.
    fn apply(
        &self,
        width: usize,
        height: usize,
        beauty: &[f32],
        albedo: Option<&[f32]>,
        normal: Option<&[f32]>,
    ) -> Result<Vec<f32>>;

    /// Validate the buffer contract, then filter.
    fn denoise(
        &self,
        width: usize,
        height: usize,
        beauty: &[f32],
        albedo: Option<&[f32]>,
        normal: Option<&[f32]>,
    ) -> Result<Vec<f32>> {
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(3))
            .ok_or_else(|| Error::Denoise(format!("image {width}x{height} is too large")))?;
        let check = |name: &str, len: usize| {
            if len == expected {
                Ok(())
            } else {
                Err(Error::Denoise(format!(
                    "{name} buffer has {len} floats, expected {expected} for {width}x{height}"
                )))
            }
        };
        check("beauty", beauty.len())?;
        if let Some(albedo) = albedo {
            check("albedo", albedo.len())?;
        }
        if let Some(normal) = normal {
            if albedo.is_none() {
                return Err(Error::Denoise("normal buffer given without albedo".into()));
            }
            check("normal", normal.len())?;
        }
        self.apply(width, height, beauty, albedo, normal)
    }
}

/// Passthrough filter.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDenoiser;

impl Denoiser for NoopDenoiser {
    fn apply(
        &self,
        _width: usize,
        _height: usize,
        beauty: &[f32],
        _albedo: Option<&[f32]>,
        _normal: Option<&[f32]>,
    ) -> Result<Vec<f32>> {
        Ok(beauty.to_vec())
    }
}

/// Clamp every channel into [0, 1] in place.
pub fn clamp_unit(buffer: &mut [f32]) {
    for v in buffer {
        *v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_normal_without_albedo() {
        let beauty = vec![0.5; 12];
        let normal = vec![0.0; 12];
        let err = NoopDenoiser.denoise(2, 2, &beauty, None, Some(&normal)).unwrap_err();
        assert!(matches!(err, Error::Denoise(_)));
    }

    #[test]
    fn test_rejects_size_mismatch() {
        let beauty = vec![0.5; 12];
        assert!(NoopDenoiser.denoise(2, 3, &beauty, None, None).is_err());
        let albedo = vec![0.5; 9];
        assert!(NoopDenoiser.denoise(2, 2, &beauty, Some(&albedo), None).is_err());
        assert_eq!(NoopDenoiser.denoise(2, 2, &beauty, None, None).unwrap(), beauty);
    }

    #[test]
    fn test_clamp_unit() {
        let mut buf = vec![-1.0, 0.25, 7.0, f32::NAN];
        clamp_unit(&mut buf);
        assert_eq!(buf, vec![0.0, 0.25, 1.0, 0.0]);
    }
}
