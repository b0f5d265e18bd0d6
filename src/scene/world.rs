//! World references and chunk/region addressing.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Blocks per chunk edge.
pub const CHUNK_SIZE: i32 = 16;

/// Chunks per region edge.
pub const REGION_CHUNKS: i32 = 32;

/// World dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    #[default]
    Overworld,
    Nether,
    End,
}

impl Dimension {
    /// Numeric id used by world files and the render farm.
    pub fn id(self) -> i32 {
        match self {
            Self::Overworld => 0,
            Self::Nether => -1,
            Self::End => 1,
        }
    }
}

/// A world the host wants tiles of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldRef {
    pub name: String,
    pub folder: PathBuf,
    pub dimension: Dimension,
    /// Lowest block y.
    pub min_y: i32,
    /// Number of block layers.
    pub height: i32,
}

impl WorldRef {
    pub fn new(name: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            folder: folder.into(),
            dimension: Dimension::Overworld,
            min_y: -64,
            height: 384,
        }
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn is_nether(&self) -> bool {
        self.dimension == Dimension::Nether
    }

    /// Default upper clip bound when the perspective sets none.
    pub fn default_max_y(&self) -> i32 {
        if self.is_nether() {
            127
        } else {
            self.min_y + self.height - 1
        }
    }
}

/// Chunk column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    #[inline]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing a block column.
    #[inline]
    pub fn of_block(x: i32, z: i32) -> Self {
        Self::new(x.div_euclid(CHUNK_SIZE), z.div_euclid(CHUNK_SIZE))
    }

    #[inline]
    pub fn region(self) -> RegionPos {
        RegionPos::new(self.x.div_euclid(REGION_CHUNKS), self.z.div_euclid(REGION_CHUNKS))
    }

    /// Square of chunks around this one, `radius` chunks in every direction.
    pub fn around(self, radius: u32) -> Vec<ChunkPos> {
        let r = radius as i32;
        let mut out = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        for dx in -r..=r {
            for dz in -r..=r {
                out.push(ChunkPos::new(self.x + dx, self.z + dz));
            }
        }
        out
    }
}

/// Region position; a region groups 32×32 chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    #[inline]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Region file name, `r.<x>.<z>`.
    pub fn name(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RegionPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r.{}.{}", self.x, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_coordinates() {
        assert_eq!(ChunkPos::of_block(-1, -16), ChunkPos::new(-1, -1));
        assert_eq!(ChunkPos::of_block(15, 16), ChunkPos::new(0, 1));
        assert_eq!(ChunkPos::new(-1, 31).region(), RegionPos::new(-1, 0));
        assert_eq!(ChunkPos::new(32, -33).region().name(), "r.1.-2");
    }

    #[test]
    fn test_around() {
        let chunks = ChunkPos::new(3, 4).around(1);
        assert_eq!(chunks.len(), 9);
        assert!(chunks.contains(&ChunkPos::new(2, 5)));
        assert_eq!(ChunkPos::new(0, 0).around(0), vec![ChunkPos::new(0, 0)]);
    }

    #[test]
    fn test_default_clip() {
        let world = WorldRef::new("world", "/srv/world");
        assert_eq!(world.default_max_y(), 319);
        let nether = world.with_dimension(Dimension::Nether);
        assert_eq!(nether.default_max_y(), 127);
    }
}
