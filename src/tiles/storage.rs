//! Tile storage.
//!
//! The pipeline only locks a stored tile, compares hashes and writes; the
//! store owns everything else. Two stores are provided: [`MemoryTileStorage`]
//! and the directory-backed [`FileTileStorage`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::key::TileKey;
use crate::render::RenderedImage;
use crate::util::{ContentHash, Error, Result};

/// One stored tile.
pub trait StorageTile: Send + Sync {
    /// Block until this process holds the tile's write lock.
    fn acquire_write_lock(&self);

    fn release_write_lock(&self);

    /// Whether the stored hash equals `hash`. A missing tile matches nothing.
    fn matches_hash(&self, hash: &ContentHash) -> Result<bool>;

    /// Replace image and hash. Caller holds the write lock.
    fn write(&self, hash: ContentHash, image: &RenderedImage, timestamp: SystemTime) -> Result<()>;

    /// Location reported in update notifications.
    fn uri(&self) -> String;
}

/// Hands out tiles of a map.
pub trait TileStorage: Send + Sync {
    fn get_tile(&self, world: &str, map: &str, key: &TileKey) -> Result<Arc<dyn StorageTile>>;
}

/// Holds a tile's write lock until dropped.
pub struct WriteLockScope<'a> {
    tile: &'a dyn StorageTile,
}

impl<'a> WriteLockScope<'a> {
    pub fn acquire(tile: &'a dyn StorageTile) -> Self {
        tile.acquire_write_lock();
        Self { tile }
    }
}

impl Drop for WriteLockScope<'_> {
    fn drop(&mut self) {
        self.tile.release_write_lock();
    }
}

/// Blocking exclusive lock that is not tied to a guard's lifetime.
#[derive(Debug, Default)]
struct TileLock {
    locked: Mutex<bool>,
    released: Condvar,
}

impl TileLock {
    fn acquire(&self) {
        let mut locked = self.locked.lock();
        while *locked {
            self.released.wait(&mut locked);
        }
        *locked = true;
    }

    fn release(&self) {
        *self.locked.lock() = false;
        self.released.notify_one();
    }

    fn is_locked(&self) -> bool {
        *self.locked.lock()
    }
}

/// Per-uri locks shared by every handle to the same tile.
#[derive(Debug, Default)]
struct LockTable {
    locks: Mutex<HashMap<String, Arc<TileLock>>>,
}

impl LockTable {
    fn get(&self, uri: &str) -> Arc<TileLock> {
        Arc::clone(self.locks.lock().entry(uri.to_string()).or_default())
    }

    fn any_locked(&self) -> bool {
        self.locks.lock().values().any(|l| l.is_locked())
    }
}

/// `<world>/<map>/<perspective>/<boost>/<tx>_<ty>.png`
fn tile_uri(world: &str, map: &str, key: &TileKey) -> String {
    format!("{world}/{map}/{}/{}/{}.png", key.perspective, key.boost, key.file_stem())
}

/// Contents of a tile in [`MemoryTileStorage`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTile {
    pub hash: ContentHash,
    pub image: RenderedImage,
    pub timestamp: SystemTime,
}

#[derive(Debug, Default)]
struct MemoryInner {
    tiles: Mutex<HashMap<String, StoredTile>>,
    writes: Mutex<usize>,
    locks: LockTable,
}

/// Tiles kept in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryTileStorage {
    inner: Arc<MemoryInner>,
}

impl MemoryTileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Option<StoredTile> {
        self.inner.tiles.lock().get(uri).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.tiles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes performed so far.
    pub fn write_count(&self) -> usize {
        *self.inner.writes.lock()
    }

    /// Whether any tile's write lock is currently held.
    pub fn any_locked(&self) -> bool {
        self.inner.locks.any_locked()
    }
}

struct MemoryTile {
    uri: String,
    lock: Arc<TileLock>,
    inner: Arc<MemoryInner>,
}

impl StorageTile for MemoryTile {
    fn acquire_write_lock(&self) {
        self.lock.acquire();
    }

    fn release_write_lock(&self) {
        self.lock.release();
    }

    fn matches_hash(&self, hash: &ContentHash) -> Result<bool> {
        Ok(self.inner.tiles.lock().get(&self.uri).is_some_and(|t| t.hash == *hash))
    }

    fn write(&self, hash: ContentHash, image: &RenderedImage, timestamp: SystemTime) -> Result<()> {
        let tile = StoredTile { hash, image: image.clone(), timestamp };
        self.inner.tiles.lock().insert(self.uri.clone(), tile);
        *self.inner.writes.lock() += 1;
        Ok(())
    }

    fn uri(&self) -> String {
        self.uri.clone()
    }
}

impl TileStorage for MemoryTileStorage {
    fn get_tile(&self, world: &str, map: &str, key: &TileKey) -> Result<Arc<dyn StorageTile>> {
        let uri = tile_uri(world, map, key);
        Ok(Arc::new(MemoryTile {
            lock: self.inner.locks.get(&uri),
            uri,
            inner: Arc::clone(&self.inner),
        }))
    }
}

/// Sidecar next to each PNG.
#[derive(Debug, Serialize, Deserialize)]
struct HashSidecar {
    hash: String,
    /// Milliseconds since the Unix epoch.
    timestamp: u64,
}

/// Tiles as PNG files under a root directory, each with a `.hash` sidecar.
#[derive(Debug)]
pub struct FileTileStorage {
    root: PathBuf,
    locks: LockTable,
}

impl FileTileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), locks: LockTable::default() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Image path of a tile.
    pub fn image_path(&self, world: &str, map: &str, key: &TileKey) -> PathBuf {
        self.root.join(tile_uri(world, map, key))
    }
}

struct FileTile {
    uri: String,
    image_path: PathBuf,
    hash_path: PathBuf,
    lock: Arc<TileLock>,
}

impl FileTile {
    fn read_sidecar(&self) -> Result<Option<HashSidecar>> {
        match fs::read(&self.hash_path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl StorageTile for FileTile {
    fn acquire_write_lock(&self) {
        self.lock.acquire();
    }

    fn release_write_lock(&self) {
        self.lock.release();
    }

    fn matches_hash(&self, hash: &ContentHash) -> Result<bool> {
        let Some(sidecar) = self.read_sidecar()? else {
            return Ok(false);
        };
        Ok(sidecar.hash == hash.to_hex() && self.image_path.exists())
    }

    fn write(&self, hash: ContentHash, image: &RenderedImage, timestamp: SystemTime) -> Result<()> {
        let dir = self
            .image_path
            .parent()
            .ok_or_else(|| Error::storage(format!("no parent for {}", self.image_path.display())))?;
        fs::create_dir_all(dir)?;

        // image first, then the hash; a torn write leaves a stale hash
        let tmp = self.image_path.with_extension("png.tmp");
        fs::write(&tmp, image.encode_png()?)?;
        fs::rename(&tmp, &self.image_path)?;

        let millis = timestamp.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64);
        let sidecar = HashSidecar { hash: hash.to_hex(), timestamp: millis };
        fs::write(&self.hash_path, serde_json::to_vec(&sidecar)?)?;
        trace!(path = %self.image_path.display(), "tile written");
        Ok(())
    }

    fn uri(&self) -> String {
        self.uri.clone()
    }
}

impl TileStorage for FileTileStorage {
    fn get_tile(&self, world: &str, map: &str, key: &TileKey) -> Result<Arc<dyn StorageTile>> {
        let uri = tile_uri(world, map, key);
        let image_path = self.root.join(&uri);
        Ok(Arc::new(FileTile {
            hash_path: image_path.with_extension("hash"),
            image_path,
            lock: self.locks.get(&uri),
            uri,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn image(v: u8) -> RenderedImage {
        RenderedImage::new(RgbaImage::from_pixel(4, 4, Rgba([v, v, v, 255])))
    }

    #[test]
    fn test_memory_tile_hash() {
        let store = MemoryTileStorage::new();
        let key = TileKey::new(1, 2, "p", 0);
        let tile = store.get_tile("w", "m", &key).unwrap();
        assert_eq!(tile.uri(), "w/m/p/0/1_2.png");

        let img = image(10);
        assert!(!tile.matches_hash(&img.hash()).unwrap());
        tile.write(img.hash(), &img, SystemTime::now()).unwrap();
        assert!(tile.matches_hash(&img.hash()).unwrap());
        assert!(!tile.matches_hash(&image(11).hash()).unwrap());
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_lock_scope_releases() {
        let store = MemoryTileStorage::new();
        let tile = store.get_tile("w", "m", &TileKey::new(0, 0, "p", 0)).unwrap();
        {
            let _scope = WriteLockScope::acquire(&*tile);
            assert!(store.any_locked());
        }
        assert!(!store.any_locked());

        let result: Result<()> = (|| {
            let _scope = WriteLockScope::acquire(&*tile);
            Err(Error::storage("disk full"))
        })();
        assert!(result.is_err());
        assert!(!store.any_locked());
    }

    #[test]
    fn test_lock_is_exclusive_across_handles() {
        let store = MemoryTileStorage::new();
        let key = TileKey::new(0, 0, "p", 0);
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|s| {
            for _ in 0..4 {
                let tile = store.get_tile("w", "m", &key).unwrap();
                let (inside, max_seen) = (inside.clone(), max_seen.clone());
                s.spawn(move || {
                    for _ in 0..10 {
                        let _scope = WriteLockScope::acquire(&*tile);
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_micros(200));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_file_tile_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTileStorage::new(dir.path());
        let key = TileKey::new(-1, 3, "iso", 1);
        let tile = store.get_tile("world", "map", &key).unwrap();
        let img = image(200);

        assert!(!tile.matches_hash(&img.hash()).unwrap());
        tile.write(img.hash(), &img, SystemTime::now()).unwrap();

        let path = dir.path().join("world/map/iso/1/-1_3.png");
        assert!(path.exists());
        assert!(path.with_extension("hash").exists());
        assert!(tile.matches_hash(&img.hash()).unwrap());

        let decoded = RenderedImage::from_png(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(decoded.hash(), img.hash());
    }
}
