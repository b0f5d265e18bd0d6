//! Directory-backed tile store with the write coordinator.

use std::sync::Arc;
use std::time::SystemTime;

use image::{Rgba, RgbaImage};
use tracemap::render::RenderedImage;
use tracemap::tiles::{
    FileTileStorage, StorageTile, TileKey, TileQueue, TileStorage, TileWriteCoordinator, UpdateLog,
};

fn image(v: u8) -> RenderedImage {
    RenderedImage::new(RgbaImage::from_pixel(16, 16, Rgba([v, 255 - v, 0, 255])))
}

fn coordinator(root: &std::path::Path, updates: Arc<UpdateLog>) -> TileWriteCoordinator {
    TileWriteCoordinator::new(
        "world",
        "surface",
        Arc::new(FileTileStorage::new(root)),
        updates,
        Arc::new(TileQueue::new()),
    )
}

#[test]
fn test_commit_writes_png_and_hash() {
    let dir = tempfile::tempdir().unwrap();
    let updates = Arc::new(UpdateLog::new());
    let c = coordinator(dir.path(), updates.clone());
    let key = TileKey::new(3, -2, "iso", 0);

    assert!(c.commit(&key, &image(10), SystemTime::now()).unwrap());
    let png = dir.path().join("world/surface/iso/0/3_-2.png");
    let sidecar = dir.path().join("world/surface/iso/0/3_-2.hash");
    assert!(png.exists());
    let hash: serde_json::Value = serde_json::from_slice(&std::fs::read(&sidecar).unwrap()).unwrap();
    assert_eq!(hash["hash"], image(10).hash().to_hex());

    assert!(!c.commit(&key, &image(10), SystemTime::now()).unwrap());
    assert_eq!(updates.len(), 1);
    assert_eq!(updates.updates()[0].uri, "world/surface/iso/0/3_-2.png");
}

#[test]
fn test_hash_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let key = TileKey::new(0, 0, "iso", 1);
    let first = Arc::new(UpdateLog::new());
    assert!(coordinator(dir.path(), first).commit(&key, &image(1), SystemTime::now()).unwrap());

    let second = Arc::new(UpdateLog::new());
    let c = coordinator(dir.path(), second.clone());
    assert!(!c.commit(&key, &image(1), SystemTime::now()).unwrap());
    assert!(second.is_empty());

    assert!(c.commit(&key, &image(2), SystemTime::now()).unwrap());
    assert_eq!(second.len(), 1);
    let stored = std::fs::read(dir.path().join("world/surface/iso/1/0_0.png")).unwrap();
    assert_eq!(RenderedImage::from_png(&stored).unwrap().hash(), image(2).hash());
}

#[test]
fn test_missing_image_forces_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTileStorage::new(dir.path());
    let key = TileKey::new(0, 0, "iso", 0);
    let img = image(5);

    let tile = store.get_tile("world", "surface", &key).unwrap();
    tile.write(img.hash(), &img, SystemTime::now()).unwrap();
    std::fs::remove_file(store.image_path("world", "surface", &key)).unwrap();
    assert!(!tile.matches_hash(&img.hash()).unwrap());
}

#[test]
fn test_concurrent_commits_write_once() {
    let dir = tempfile::tempdir().unwrap();
    let updates = Arc::new(UpdateLog::new());
    let c = coordinator(dir.path(), updates.clone());
    let key = TileKey::new(7, 7, "iso", 0);
    let img = image(42);

    let written: usize = std::thread::scope(|s| {
        let handles: Vec<_> =
            (0..8).map(|_| s.spawn(|| c.commit(&key, &img, SystemTime::now()).unwrap())).collect();
        handles.into_iter().map(|h| usize::from(h.join().unwrap())).sum()
    });
    assert_eq!(written, 1);
    assert_eq!(updates.len(), 1);
}
