//! Local rendering through the tile pipeline into a memory store.

use std::sync::Arc;
use std::time::SystemTime;

use tracemap::camera::{CameraProjector, ProjectionParams};
use tracemap::render::local::{DenoiseOptions, LocalOptions, LocalPathTracer};
use tracemap::render::{RenderBackend, TextureSet};
use tracemap::scene::{Dimension, Geometry, Material, SceneDescription, StaticGeometryProvider, WorldRef};
use tracemap::tiles::{
    MapTileRenderer, MemoryTileStorage, TileOutcome, TileQueue, TileSettings, TileWriteCoordinator,
    UpdateLog,
};
use tracemap::util::IVec3;

fn world_geometry() -> Geometry {
    let mut geometry = Geometry::new();
    let grass = geometry.add_material(Material::new("grass", [0.3, 0.5, 0.2]));
    let stone = geometry.add_material(Material::new("stone", [0.5, 0.5, 0.5]));
    geometry.fill(IVec3::new(-64, 61, -64), IVec3::new(64, 62, 64), grass);
    geometry.fill(IVec3::new(0, 63, -4), IVec3::new(3, 68, -1), stone);
    geometry
}

struct Setup {
    storage: MemoryTileStorage,
    updates: Arc<UpdateLog>,
    renderer: MapTileRenderer,
}

fn setup(denoise: bool) -> Setup {
    let provider = StaticGeometryProvider::new();
    provider.insert("world", Dimension::Overworld, world_geometry());

    let storage = MemoryTileStorage::new();
    let updates = Arc::new(UpdateLog::new());
    let coordinator = TileWriteCoordinator::new(
        "world",
        "surface",
        Arc::new(storage.clone()),
        updates.clone(),
        Arc::new(TileQueue::new()),
    );
    let backend = LocalPathTracer::new(LocalOptions {
        threads: 2,
        denoise: DenoiseOptions {
            enabled: denoise,
            albedo_samples_per_pixel: 2,
            normal_samples_per_pixel: 2,
        },
        ..Default::default()
    })
    .unwrap();
    let settings = TileSettings { target_spp: 10, ..Default::default() };
    let renderer = MapTileRenderer::new(
        WorldRef::new("world", "/worlds/world"),
        settings,
        CameraProjector::new(ProjectionParams::default()).unwrap(),
        Arc::new(backend),
        Arc::new(provider),
        Arc::new(coordinator),
    );
    Setup { storage, updates, renderer }
}

#[test]
fn test_local_tile_commits_once() {
    let s = setup(false);
    let key = s.renderer.key(0, 0);

    assert_eq!(s.renderer.render_tile(&key), TileOutcome::Updated);
    let stored = s.storage.get("world/surface/default/0/0_0.png").unwrap();
    assert_eq!((stored.image.width(), stored.image.height()), (128, 128));
    assert_eq!(s.updates.len(), 1);

    // unchanged scene renders to the same pixels
    assert_eq!(s.renderer.render_tile(&key), TileOutcome::Unchanged);
    assert_eq!(s.updates.len(), 1);
    assert_eq!(s.storage.write_count(), 1);
}

#[test]
fn test_direct_commit_of_backend_image() {
    let s = setup(false);
    let key = s.renderer.key(0, 0);
    let init = |scene: &mut SceneDescription| s.renderer.initialize_scene(&key, scene);
    let image = s.renderer.backend().render(&init, &TextureSet::none()).wait().unwrap();
    assert_eq!((image.width(), image.height()), (128, 128));

    let coordinator = s.renderer.coordinator();
    assert!(coordinator.commit(&key, &image, SystemTime::now()).unwrap());
    assert!(!coordinator.commit(&key, &image, SystemTime::now()).unwrap());
    assert_eq!(s.updates.len(), 1);
}

#[test]
fn test_tile_shows_ground() {
    let s = setup(false);
    let key = s.renderer.key(0, 0);
    s.renderer.render_tile(&key);
    let stored = s.storage.get("world/surface/default/0/0_0.png").unwrap();
    let opaque = stored.image.image().pixels().filter(|p| p[3] == 255).count();
    assert!(opaque > 128 * 128 / 2, "only {opaque} opaque pixels");
}

#[test]
fn test_denoised_tile() {
    let s = setup(true);
    let key = s.renderer.key(1, 0);
    assert_eq!(s.renderer.render_tile(&key), TileOutcome::Updated);
    let stored = s.storage.get("world/surface/default/0/1_0.png").unwrap();
    assert_eq!(stored.image.width(), 128);
}

#[test]
fn test_boost_doubles_canvas() {
    let provider = StaticGeometryProvider::new();
    provider.insert("world", Dimension::Overworld, world_geometry());
    let storage = MemoryTileStorage::new();
    let coordinator = TileWriteCoordinator::new(
        "world",
        "surface",
        Arc::new(storage.clone()),
        Arc::new(UpdateLog::new()),
        Arc::new(TileQueue::new()),
    );
    let renderer = MapTileRenderer::new(
        WorldRef::new("world", "/worlds/world"),
        TileSettings { boost: 1, target_spp: 1, ..Default::default() },
        CameraProjector::new(ProjectionParams::default()).unwrap(),
        Arc::new(LocalPathTracer::new(LocalOptions::default()).unwrap()),
        Arc::new(provider),
        Arc::new(coordinator),
    );
    assert_eq!(renderer.render_tile(&renderer.key(0, 0)), TileOutcome::Updated);
    let stored = storage.get("world/surface/default/1/0_0.png").unwrap();
    assert_eq!(stored.image.width(), 256);
}
