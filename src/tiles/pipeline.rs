//! Render-and-commit pipeline for the tiles of one map.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{debug, info_span};

use super::coordinator::{FailureOutcome, TileWriteCoordinator};
use super::key::TileKey;
use crate::camera::{CameraProjector, TILE_SIZE};
use crate::render::{RenderBackend, TextureSet};
use crate::scene::{GeometryProvider, SceneDescription, TemplateScene, WorldRef};
use crate::util::{Error, Result};

/// Per-map tile settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSettings {
    /// Perspective id carried in every [`TileKey`].
    pub perspective: String,
    pub boost: u32,
    pub map_zoom_out: u32,
    pub chunk_padding: u32,
    pub target_spp: u32,
    /// Clip bounds; `None` uses the world's.
    pub min_height: Option<i32>,
    pub max_height: Option<i32>,
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            perspective: "default".into(),
            boost: 0,
            map_zoom_out: 0,
            chunk_padding: 0,
            target_spp: 100,
            min_height: None,
            max_height: None,
        }
    }
}

/// Result of one [`MapTileRenderer::render_tile`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    /// New image stored and announced.
    Updated,
    /// Rendered image equals the stored one.
    Unchanged,
    /// Another render of the same key was in progress.
    Busy,
    Failed(FailureOutcome),
}

/// Keys with a render in progress.
#[derive(Debug, Default)]
struct ActiveTiles {
    keys: Mutex<HashSet<TileKey>>,
}

impl ActiveTiles {
    fn claim(&self, key: &TileKey) -> Option<ActiveClaim<'_>> {
        if !self.keys.lock().insert(key.clone()) {
            return None;
        }
        Some(ActiveClaim { active: self, key: key.clone() })
    }

    fn contains(&self, key: &TileKey) -> bool {
        self.keys.lock().contains(key)
    }
}

/// Releases the key when dropped.
struct ActiveClaim<'a> {
    active: &'a ActiveTiles,
    key: TileKey,
}

impl Drop for ActiveClaim<'_> {
    fn drop(&mut self) {
        self.active.keys.lock().remove(&self.key);
    }
}

/// Renders tiles of one map perspective and commits them.
pub struct MapTileRenderer {
    world: WorldRef,
    settings: TileSettings,
    projector: CameraProjector,
    template: Option<Arc<TemplateScene>>,
    textures: TextureSet,
    backend: Arc<dyn RenderBackend>,
    geometry: Arc<dyn GeometryProvider>,
    coordinator: Arc<TileWriteCoordinator>,
    active: ActiveTiles,
}

impl MapTileRenderer {
    pub fn new(
        world: WorldRef,
        settings: TileSettings,
        projector: CameraProjector,
        backend: Arc<dyn RenderBackend>,
        geometry: Arc<dyn GeometryProvider>,
        coordinator: Arc<TileWriteCoordinator>,
    ) -> Self {
        Self {
            world,
            settings,
            projector,
            template: None,
            textures: TextureSet::none(),
            backend,
            geometry,
            coordinator,
            active: ActiveTiles::default(),
        }
    }

    pub fn with_template(mut self, template: Option<TemplateScene>) -> Self {
        self.template = template.map(Arc::new);
        self
    }

    pub fn with_textures(mut self, textures: TextureSet) -> Self {
        self.textures = textures;
        self
    }

    pub fn settings(&self) -> &TileSettings {
        &self.settings
    }

    pub fn backend(&self) -> &Arc<dyn RenderBackend> {
        &self.backend
    }

    pub fn coordinator(&self) -> &Arc<TileWriteCoordinator> {
        &self.coordinator
    }

    /// Key of tile (tx, ty) in this map.
    pub fn key(&self, tx: i32, ty: i32) -> TileKey {
        TileKey::new(tx, ty, self.settings.perspective.clone(), self.settings.boost)
    }

    pub fn is_rendering(&self, key: &TileKey) -> bool {
        self.active.contains(key)
    }

    /// Vertical clip bounds, perspective first, then the world's.
    pub fn clip_bounds(&self) -> (i32, i32) {
        (
            self.settings.min_height.unwrap_or(self.world.min_y),
            self.settings.max_height.unwrap_or_else(|| self.world.default_max_y()),
        )
    }

    /// Render a tile and commit it; failures go to the coordinator.
    pub fn render_tile(&self, key: &TileKey) -> TileOutcome {
        let span = info_span!("tile", tx = key.tx, ty = key.ty, boost = key.boost);
        let _enter = span.enter();

        let Some(_claim) = self.active.claim(key) else {
            debug!("tile already rendering, skipped");
            return TileOutcome::Busy;
        };
        match self.try_render(key) {
            Ok(true) => TileOutcome::Updated,
            Ok(false) => TileOutcome::Unchanged,
            Err(e) => TileOutcome::Failed(self.coordinator.handle_failure(key, &e)),
        }
    }

    /// Render and commit without failure handling. Caller holds the claim.
    fn try_render(&self, key: &TileKey) -> Result<bool> {
        if key.perspective != self.settings.perspective || key.boost != self.settings.boost {
            return Err(Error::config(format!("tile {key} does not belong to this map")));
        }
        let started = SystemTime::now();
        let init = |scene: &mut SceneDescription| self.initialize_scene(key, scene);
        let image = self.backend.render(&init, &self.textures).wait()?;
        self.coordinator.commit(key, &image, started)
    }

    /// Fill a fresh scene for one tile.
    pub fn initialize_scene(&self, key: &TileKey, scene: &mut SceneDescription) -> Result<()> {
        if let Some(template) = &self.template {
            scene.apply_template(template);
        }
        let size = TILE_SIZE << key.boost.min(8);
        scene.name = key.file_stem();
        scene.set_canvas_size(size, size);
        scene.transparent_sky = true;

        let (y_min, y_max) = self.clip_bounds();
        scene.y_clip_min = y_min;
        scene.y_clip_max = y_max;
        scene.camera =
            self.projector.compute_camera(key.tx, key.ty, self.settings.map_zoom_out, 0);

        let chunks = self.projector.required_chunks(
            key.tx,
            key.ty,
            self.settings.map_zoom_out,
            y_min,
            y_max,
            self.settings.chunk_padding,
        );
        scene.geometry = self.geometry.load_geometry(&self.world, self.world.dimension, &chunks)?;
        scene.chunks = chunks;
        scene.world = Some(self.world.clone());
        scene.target_spp = self.settings.target_spp;
        debug!(chunks = scene.chunks.len(), blocks = scene.geometry.len(), "scene initialized");
        Ok(())
    }
}

impl std::fmt::Debug for MapTileRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapTileRenderer")
            .field("world", &self.world.name)
            .field("settings", &self.settings)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}
