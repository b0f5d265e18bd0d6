//! # tracemap
//!
//! Path-traced map tiles from block-world geometry.
//!
//! A tile is an isometric orthographic view of the world. Rendering one
//! tile means turning its coordinates into a camera pose, building a scene
//! around the visible chunks, rendering it either on this machine or on a
//! render farm, and committing the image to tile storage only when it
//! changed.
//!
//! ## Modules
//!
//! - [`util`] - Errors and failure classification, content hashes, 3×3 transforms
//! - [`camera`] - Tile coordinates → camera pose
//! - [`scene`] - Scene description, geometry, template scenes
//! - [`render`] - Render backends: local path tracer and render farm client
//! - [`denoise`] - Albedo/normal guided denoising of the beauty buffer
//! - [`tiles`] - Tile keys, storage, write coordination, render pipeline
//! - [`config`] - Per-map JSON configuration
//!
//! ## Example
//!
//! ```ignore
//! use tracemap::prelude::*;
//!
//! let config = MapConfig::load("map.json".as_ref())?;
//! let backend = config.build_backend()?;
//! let coordinator = TileWriteCoordinator::new(
//!     "world", &config.name,
//!     Arc::new(FileTileStorage::new("tiles")),
//!     Arc::new(UpdateLog::new()),
//!     Arc::new(TileQueue::new()),
//! );
//! let renderer = MapTileRenderer::new(world, config.tile_settings(), config.projector()?,
//!     backend, geometry, Arc::new(coordinator));
//! renderer.render_tile(&renderer.key(0, 0));
//! ```

pub mod camera;
pub mod config;
pub mod denoise;
pub mod render;
pub mod scene;
pub mod tiles;
pub mod util;

pub use util::{Error, FailureKind, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::camera::{CameraPose, CameraProjector, ProjectionMode, ProjectionParams};
    pub use crate::config::MapConfig;
    pub use crate::denoise::{Denoiser, GuidedBilateralDenoiser};
    pub use crate::render::local::{LocalOptions, LocalPathTracer};
    pub use crate::render::remote::{RemoteJobRenderer, RemoteOptions};
    pub use crate::render::{RenderBackend, RenderedImage, TextureSet};
    pub use crate::scene::{Geometry, GeometryProvider, SceneDescription, WorldRef};
    pub use crate::tiles::{
        FileTileStorage, MapTileRenderer, MemoryTileStorage, TileKey, TileQueue,
        TileWriteCoordinator, UpdateLog,
    };
    pub use crate::util::{Error, FailureKind, Result};
}
