//! Block geometry: unit cubes with a material palette.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::world::{ChunkPos, RegionPos};
use crate::util::IVec3;

/// Surface description shared by many blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Texture name, e.g. `stone`.
    pub name: String,
    /// Linear RGB base colour, used when no texture provides one.
    pub color: [f32; 3],
    /// Emitted radiance multiplier of `color`.
    #[serde(default)]
    pub emittance: f32,
}

impl Material {
    pub fn new(name: impl Into<String>, color: [f32; 3]) -> Self {
        Self { name: name.into(), color, emittance: 0.0 }
    }

    pub fn emissive(mut self, emittance: f32) -> Self {
        self.emittance = emittance;
        self
    }
}

/// Unit cube at an integer position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// Index into the material palette.
    pub material: u16,
}

impl Block {
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32, material: u16) -> Self {
        Self { x, y, z, material }
    }

    #[inline]
    pub fn chunk(&self) -> ChunkPos {
        ChunkPos::of_block(self.x, self.z)
    }

    #[inline]
    pub fn region(&self) -> RegionPos {
        self.chunk().region()
    }
}

/// Geometry set of one scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    materials: Vec<Material>,
    blocks: Vec<Block>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_materials(materials: Vec<Material>) -> Self {
        Self { materials, blocks: Vec::new() }
    }

    /// Add a material, returning its palette index.
    pub fn add_material(&mut self, material: Material) -> u16 {
        if let Some(i) = self.materials.iter().position(|m| m.name == material.name) {
            return i as u16;
        }
        self.materials.push(material);
        (self.materials.len() - 1) as u16
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Fill an inclusive box of blocks with one material.
    pub fn fill(&mut self, min: IVec3, max: IVec3, material: u16) {
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    self.blocks.push(Block::new(x, y, z, material));
                }
            }
        }
    }

    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[inline]
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    #[inline]
    pub fn material(&self, id: u16) -> Option<&Material> {
        self.materials.get(id as usize)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Keep only blocks inside the given chunks.
    pub fn filter_chunks(&self, chunks: &HashSet<ChunkPos>) -> Geometry {
        self.filter(|b| chunks.contains(&b.chunk()))
    }

    /// Keep only blocks with `min <= y <= max`.
    pub fn clip_y(&self, min: i32, max: i32) -> Geometry {
        self.filter(|b| b.y >= min && b.y <= max)
    }

    /// Split into one geometry per region, each with the full palette.
    pub fn split_regions(&self) -> BTreeMap<RegionPos, Geometry> {
        let mut regions: BTreeMap<RegionPos, Geometry> = BTreeMap::new();
        for block in &self.blocks {
            regions
                .entry(block.region())
                .or_insert_with(|| Geometry::with_materials(self.materials.clone()))
                .blocks
                .push(*block);
        }
        regions
    }

    /// Inclusive block bounds, `None` when empty.
    pub fn bounds(&self) -> Option<(IVec3, IVec3)> {
        let first = self.blocks.first()?;
        let mut min = IVec3::new(first.x, first.y, first.z);
        let mut max = min;
        for b in &self.blocks[1..] {
            let p = IVec3::new(b.x, b.y, b.z);
            min = min.min(p);
            max = max.max(p);
        }
        Some((min, max))
    }

    fn filter(&self, keep: impl Fn(&Block) -> bool) -> Geometry {
        Geometry {
            materials: self.materials.clone(),
            blocks: self.blocks.iter().copied().filter(|b| keep(b)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Geometry {
        let mut g = Geometry::new();
        let stone = g.add_material(Material::new("stone", [0.5, 0.5, 0.5]));
        g.push(Block::new(0, 0, 0, stone));
        g.push(Block::new(-1, 5, -1, stone));
        g.push(Block::new(600, 70, 3, stone));
        g
    }

    #[test]
    fn test_material_dedup() {
        let mut g = Geometry::new();
        let a = g.add_material(Material::new("stone", [0.5; 3]));
        let b = g.add_material(Material::new("dirt", [0.4, 0.3, 0.2]));
        let c = g.add_material(Material::new("stone", [0.1; 3]));
        assert_eq!((a, b, c), (0, 1, 0));
        assert_eq!(g.materials().len(), 2);
    }

    #[test]
    fn test_split_regions() {
        let regions = sample().split_regions();
        let names: Vec<String> = regions.keys().map(|r| r.name()).collect();
        assert_eq!(names, vec!["r.-1.-1", "r.0.0", "r.1.0"]);
        assert!(regions.values().all(|g| g.materials().len() == 1));
        assert_eq!(regions.values().map(Geometry::len).sum::<usize>(), 3);
    }

    #[test]
    fn test_clip_and_filter() {
        let g = sample();
        assert_eq!(g.clip_y(0, 64).len(), 2);
        let chunks: HashSet<ChunkPos> = [ChunkPos::new(0, 0)].into_iter().collect();
        assert_eq!(g.filter_chunks(&chunks).blocks(), &[Block::new(0, 0, 0, 0)]);
    }

    #[test]
    fn test_bounds() {
        let (min, max) = sample().bounds().unwrap();
        assert_eq!(min, IVec3::new(-1, 0, -1));
        assert_eq!(max, IVec3::new(600, 70, 3));
        assert!(Geometry::new().bounds().is_none());
    }
}
