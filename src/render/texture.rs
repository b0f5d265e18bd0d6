//! Texture packs and the process-wide loaded-texture cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::util::{Error, Result};

/// Texture packs a render asks for, in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureSet {
    packs: Vec<PathBuf>,
}

impl TextureSet {
    pub fn new(packs: Vec<PathBuf>) -> Self {
        Self { packs }
    }

    /// No pack requested; only the backend default applies.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn single(pack: impl Into<PathBuf>) -> Self {
        Self { packs: vec![pack.into()] }
    }

    pub fn packs(&self) -> &[PathBuf] {
        &self.packs
    }

    /// Requested packs followed by `default`, without duplicates.
    pub fn resolve(&self, default: Option<&Path>) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = Vec::with_capacity(self.packs.len() + 1);
        for p in self.packs.iter().map(PathBuf::as_path).chain(default) {
            if !out.iter().any(|q| q.as_path() == p) {
                out.push(p.to_path_buf());
            }
        }
        out
    }
}

/// Base colours per material name, linear RGB.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TexturePalette {
    colors: HashMap<String, [f32; 3]>,
}

impl TexturePalette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless a higher-priority pack already provided the name.
    pub fn insert_missing(&mut self, name: impl Into<String>, color: [f32; 3]) {
        self.colors.entry(name.into()).or_insert(color);
    }

    pub fn get(&self, name: &str) -> Option<[f32; 3]> {
        self.colors.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// Reads texture packs into a palette.
pub trait TextureLoader: Send + Sync {
    /// Load packs in priority order; earlier packs win.
    fn load(&self, packs: &[PathBuf]) -> Result<TexturePalette>;
}

/// Loads `<pack>/<material>.png` files and averages their opaque pixels.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngTextureLoader;

impl TextureLoader for PngTextureLoader {
    fn load(&self, packs: &[PathBuf]) -> Result<TexturePalette> {
        let mut palette = TexturePalette::new();
        for pack in packs {
            let pack_err = |reason: String| Error::TexturePack { path: pack.clone(), reason };
            let entries = std::fs::read_dir(pack).map_err(|e| pack_err(e.to_string()))?;
            let mut files: Vec<PathBuf> = entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")))
                .collect();
            files.sort();

            for file in files {
                let Some(name) = file.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let img = image::open(&file)
                    .map_err(|e| pack_err(format!("{}: {}", file.display(), e)))?
                    .to_rgba8();
                if let Some(color) = average_color(&img) {
                    palette.insert_missing(name, color);
                }
            }
            debug!(pack = %pack.display(), textures = palette.len(), "loaded texture pack");
        }
        Ok(palette)
    }
}

/// Mean linear colour of pixels with non-zero alpha.
fn average_color(img: &image::RgbaImage) -> Option<[f32; 3]> {
    let mut sum = [0.0f64; 3];
    let mut n = 0u32;
    for px in img.pixels() {
        if px[3] == 0 {
            continue;
        }
        for c in 0..3 {
            sum[c] += f64::from(srgb_to_linear(px[c]));
        }
        n += 1;
    }
    if n == 0 {
        return None;
    }
    let n = f64::from(n);
    Some([(sum[0] / n) as f32, (sum[1] / n) as f32, (sum[2] / n) as f32])
}

#[inline]
fn srgb_to_linear(v: u8) -> f32 {
    (f32::from(v) / 255.0).powf(2.2)
}

/// Last loaded palette, keyed by the resolved pack list.
///
/// Loading holds the lock, so renders that need different packs serialize
/// against each other.
pub struct TexturePackCache {
    loader: Box<dyn TextureLoader>,
    current: Mutex<Option<(Vec<PathBuf>, Arc<TexturePalette>)>>,
    loads: AtomicUsize,
}

impl TexturePackCache {
    pub fn new(loader: Box<dyn TextureLoader>) -> Self {
        Self { loader, current: Mutex::new(None), loads: AtomicUsize::new(0) }
    }

    /// Palette for `packs`, loading only if the list differs from the
    /// previously loaded one.
    pub fn get(&self, packs: &[PathBuf]) -> Result<Arc<TexturePalette>> {
        let mut current = self.current.lock();
        if let Some((key, palette)) = current.as_ref() {
            if key.as_slice() == packs {
                return Ok(Arc::clone(palette));
            }
        }

        let palette = if packs.is_empty() {
            Arc::new(TexturePalette::new())
        } else {
            info!(packs = ?packs, "loading texture packs");
            Arc::new(self.loader.load(packs)?)
        };
        self.loads.fetch_add(1, Ordering::Relaxed);
        *current = Some((packs.to_vec(), Arc::clone(&palette)));
        Ok(palette)
    }

    /// Number of loads performed so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl Default for TexturePackCache {
    fn default() -> Self {
        Self::new(Box::new(PngTextureLoader))
    }
}

impl std::fmt::Debug for TexturePackCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TexturePackCache")
            .field("loads", &self.load_count())
            .finish_non_exhaustive()
    }
}

/// Default pack plus the cache, shared by a backend and its renders.
#[derive(Debug, Default)]
pub struct TextureResources {
    default_pack: RwLock<Option<PathBuf>>,
    cache: TexturePackCache,
}

impl TextureResources {
    pub fn new(cache: TexturePackCache) -> Self {
        Self { default_pack: RwLock::new(None), cache }
    }

    pub fn set_default_pack(&self, path: Option<PathBuf>) {
        *self.default_pack.write() = path;
    }

    pub fn default_pack(&self) -> Option<PathBuf> {
        self.default_pack.read().clone()
    }

    /// Resolved pack list for a render.
    pub fn resolve(&self, textures: &TextureSet) -> Vec<PathBuf> {
        textures.resolve(self.default_pack.read().as_deref())
    }

    /// Palette for a render, memoized by resolved pack list.
    pub fn palette(&self, textures: &TextureSet) -> Result<Arc<TexturePalette>> {
        let packs = self.resolve(textures);
        self.cache.get(&packs)
    }

    pub fn cache(&self) -> &TexturePackCache {
        &self.cache
    }
}
