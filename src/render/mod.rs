//! Render backends.
//!
//! A [`RenderBackend`] turns a scene-initialization callback plus a
//! [`TextureSet`] into a [`PendingRender`]. Two strategies exist:
//!
//! - [`local::LocalPathTracer`] - progressive CPU path tracing with optional
//!   normal/albedo passes for the denoiser
//! - [`remote::RemoteJobRenderer`] - job submission to a render farm, polled
//!   on a background thread
//!
//! Errors surface through the pending render; callers classify them with
//! [`Error::kind`](crate::util::Error::kind).

pub mod local;
pub mod remote;
mod texture;

pub use texture::*;

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use image::RgbaImage;

use crate::scene::SceneDescription;
use crate::util::{ContentHash, Error, Result};

/// Scene initialization callback, run once per render on the caller's thread.
pub type SceneInit<'a> = &'a (dyn Fn(&mut SceneDescription) -> Result<()> + Sync);

/// Renders one scene per call.
pub trait RenderBackend: Send + Sync {
    /// Start a render.
    ///
    /// `initialize_scene` runs before this returns. Local backends finish
    /// the render before returning; remote ones return while the job runs.
    fn render(&self, initialize_scene: SceneInit<'_>, textures: &TextureSet) -> PendingRender;

    /// Texture pack used when a render requests none, or after the
    /// requested ones.
    fn set_default_texturepack(&self, path: Option<PathBuf>);

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Result of a render that may still be running.
#[derive(Debug)]
pub struct PendingRender {
    rx: Receiver<Result<RenderedImage>>,
}

impl PendingRender {
    /// Create a pending render and the sender that completes it.
    pub fn channel() -> (Sender<Result<RenderedImage>>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }

    /// An already finished render.
    pub fn ready(result: Result<RenderedImage>) -> Self {
        let (tx, pending) = Self::channel();
        // receiver is alive, send cannot fail
        let _ = tx.send(result);
        pending
    }

    /// Block until the render finishes.
    ///
    /// A producer that went away without answering counts as interrupted.
    pub fn wait(self) -> Result<RenderedImage> {
        self.rx.recv().unwrap_or(Err(Error::Interrupted))
    }

    /// Block for at most `timeout`; `None` if still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<RenderedImage>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(Error::Interrupted)),
        }
    }
}

/// Finished RGBA raster with the digest of its pixel buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    image: RgbaImage,
    hash: ContentHash,
}

impl RenderedImage {
    pub fn new(image: RgbaImage) -> Self {
        let hash = ContentHash::of(image.as_raw());
        Self { image, hash }
    }

    /// Decode a PNG (as served by the render farm).
    pub fn from_png(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)?;
        Ok(Self::new(image.to_rgba8()))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[inline]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Digest of the raw RGBA bytes, row-major.
    #[inline]
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Encode as PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut out = std::io::Cursor::new(Vec::new());
        self.image.write_to(&mut out, image::ImageFormat::Png)?;
        Ok(out.into_inner())
    }
}
