//! World geometry sources.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use super::geometry::Geometry;
use super::world::{ChunkPos, Dimension, WorldRef};
use crate::util::{Error, Result};

/// Loads the blocks of a set of chunks.
///
/// World-format parsing lives behind this trait; the renderer only sees
/// finished [`Geometry`].
pub trait GeometryProvider: Send + Sync {
    fn load_geometry(
        &self,
        world: &WorldRef,
        dimension: Dimension,
        chunks: &[ChunkPos],
    ) -> Result<Geometry>;
}

/// In-memory provider keyed by world name and dimension.
#[derive(Debug, Default)]
pub struct StaticGeometryProvider {
    worlds: RwLock<HashMap<(String, Dimension), Geometry>>,
}

impl StaticGeometryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the geometry of a world dimension.
    pub fn insert(&self, world: &str, dimension: Dimension, geometry: Geometry) {
        self.worlds.write().insert((world.to_string(), dimension), geometry);
    }
}

impl GeometryProvider for StaticGeometryProvider {
    fn load_geometry(
        &self,
        world: &WorldRef,
        dimension: Dimension,
        chunks: &[ChunkPos],
    ) -> Result<Geometry> {
        let worlds = self.worlds.read();
        let geometry = worlds.get(&(world.name.clone(), dimension)).ok_or_else(|| {
            Error::scene(format!("no geometry for world {} ({:?})", world.name, dimension))
        })?;
        let wanted: HashSet<ChunkPos> = chunks.iter().copied().collect();
        Ok(geometry.filter_chunks(&wanted))
    }
}
