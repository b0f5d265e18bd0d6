//! Binary geometry payload.
//!
//! Layout (little endian), zlib compressed after the 6-byte header:
//! ```text
//! "TMGEO" version:u8
//! materials:u16 { name_len:u16 name:[u8] r:f32 g:f32 b:f32 emittance:f32 }
//! blocks:u32    { x:i32 y:i32 z:i32 material:u16 }
//! ```

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::geometry::{Block, Geometry, Material};
use crate::util::{Error, Result};

const MAGIC: &[u8; 5] = b"TMGEO";
const VERSION: u8 = 1;

/// Serialize geometry to the upload format.
pub fn encode_geometry(geometry: &Geometry) -> Result<Vec<u8>> {
    let materials = geometry.materials();
    let materials_len = u16::try_from(materials.len())
        .map_err(|_| Error::scene(format!("too many materials: {}", materials.len())))?;
    let blocks_len = u32::try_from(geometry.len())
        .map_err(|_| Error::scene(format!("too many blocks: {}", geometry.len())))?;

    let mut out = Vec::with_capacity(MAGIC.len() + 1 + geometry.len() * 4);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);

    let mut encoder = ZlibEncoder::new(out, Compression::default());
    encoder.write_u16::<LittleEndian>(materials_len)?;
    for material in materials {
        let name = material.name.as_bytes();
        let name_len = u16::try_from(name.len())
            .map_err(|_| Error::scene(format!("material name too long: {}", material.name)))?;
        encoder.write_u16::<LittleEndian>(name_len)?;
        encoder.write_all(name)?;
        for c in material.color {
            encoder.write_f32::<LittleEndian>(c)?;
        }
        encoder.write_f32::<LittleEndian>(material.emittance)?;
    }

    encoder.write_u32::<LittleEndian>(blocks_len)?;
    for block in geometry.blocks() {
        encoder.write_i32::<LittleEndian>(block.x)?;
        encoder.write_i32::<LittleEndian>(block.y)?;
        encoder.write_i32::<LittleEndian>(block.z)?;
        encoder.write_u16::<LittleEndian>(block.material)?;
    }
    Ok(encoder.finish()?)
}

/// Parse the upload format.
pub fn decode_geometry(data: &[u8]) -> Result<Geometry> {
    if data.len() < MAGIC.len() + 1 || &data[..MAGIC.len()] != MAGIC {
        return Err(Error::scene("not a geometry payload"));
    }
    let version = data[MAGIC.len()];
    if version != VERSION {
        return Err(Error::scene(format!("unsupported geometry version {version}")));
    }

    let mut raw = Vec::new();
    ZlibDecoder::new(&data[MAGIC.len() + 1..]).read_to_end(&mut raw)?;
    let mut cur = Cursor::new(raw.as_slice());

    let materials_len = cur.read_u16::<LittleEndian>()?;
    let mut materials = Vec::with_capacity(materials_len as usize);
    for _ in 0..materials_len {
        let name_len = cur.read_u16::<LittleEndian>()? as usize;
        let mut name = vec![0u8; name_len];
        cur.read_exact(&mut name)?;
        let name = String::from_utf8(name)
            .map_err(|e| Error::scene(format!("material name is not UTF-8: {e}")))?;
        let color = [
            cur.read_f32::<LittleEndian>()?,
            cur.read_f32::<LittleEndian>()?,
            cur.read_f32::<LittleEndian>()?,
        ];
        let emittance = cur.read_f32::<LittleEndian>()?;
        materials.push(Material { name, color, emittance });
    }

    let blocks_len = cur.read_u32::<LittleEndian>()? as usize;
    let mut geometry = Geometry::with_materials(materials);
    for _ in 0..blocks_len {
        let x = cur.read_i32::<LittleEndian>()?;
        let y = cur.read_i32::<LittleEndian>()?;
        let z = cur.read_i32::<LittleEndian>()?;
        let material = cur.read_u16::<LittleEndian>()?;
        if material >= materials_len {
            return Err(Error::scene(format!(
                "block at {x},{y},{z} references material {material} of {materials_len}"
            )));
        }
        geometry.push(Block::new(x, y, z, material));
    }
    Ok(geometry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut g = Geometry::new();
        let stone = g.add_material(Material::new("stone", [0.5, 0.5, 0.5]));
        let lamp = g.add_material(Material::new("glowstone", [1.0, 0.9, 0.6]).emissive(4.0));
        g.push(Block::new(-5, 64, 12, stone));
        g.push(Block::new(0, 65, 0, lamp));

        let bytes = encode_geometry(&g).unwrap();
        assert_eq!(&bytes[..5], b"TMGEO");
        assert_eq!(decode_geometry(&bytes).unwrap(), g);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(decode_geometry(b"").is_err());
        assert!(decode_geometry(b"PNG\x0d\x0a\x1a\x0a").is_err());
        assert!(decode_geometry(b"TMGEO\x02").is_err());
    }

    #[test]
    fn test_rejects_dangling_material() {
        let mut raw = Vec::new();
        raw.write_u16::<LittleEndian>(0).unwrap();
        raw.write_u32::<LittleEndian>(1).unwrap();
        for v in [1, 2, 3] {
            raw.write_i32::<LittleEndian>(v).unwrap();
        }
        raw.write_u16::<LittleEndian>(0).unwrap();

        let mut data = b"TMGEO\x01".to_vec();
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&raw).unwrap();
        data.extend(enc.finish().unwrap());

        assert!(matches!(decode_geometry(&data), Err(Error::Scene(_))));
    }
}
