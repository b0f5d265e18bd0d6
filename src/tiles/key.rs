//! Canonical tile identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::util::Error;

/// Identity of one tile render.
///
/// Carries every field that changes the rendered image; dedup, write
/// locking and the active-render claim all use the full key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub tx: i32,
    pub ty: i32,
    /// Perspective id; may contain any character but a newline.
    pub perspective: String,
    /// Zoom boost; the image edge is `128 << boost` pixels.
    pub boost: u32,
}

impl TileKey {
    pub fn new(tx: i32, ty: i32, perspective: impl Into<String>, boost: u32) -> Self {
        Self { tx, ty, perspective: perspective.into(), boost }
    }

    /// File stem, `<tx>_<ty>`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.tx, self.ty)
    }

    /// Same perspective and boost, shifted by (dx, dy). Coordinates wrap at
    /// the `i32` range.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self { tx: self.tx.wrapping_add(dx), ty: self.ty.wrapping_add(dy), ..self.clone() }
    }

    /// The eight surrounding tiles, row by row.
    pub fn adjacent(&self) -> [TileKey; 8] {
        [
            self.offset(-1, -1),
            self.offset(0, -1),
            self.offset(1, -1),
            self.offset(-1, 0),
            self.offset(1, 0),
            self.offset(-1, 1),
            self.offset(0, 1),
            self.offset(1, 1),
        ]
    }
}

/// Queue form, `tx,ty,perspective,boost`.
impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.tx, self.ty, self.perspective, self.boost)
    }
}

impl FromStr for TileKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::storage(format!("invalid tile key {s:?}"));
        // the perspective id may itself contain commas
        let (rest, boost) = s.rsplit_once(',').ok_or_else(invalid)?;
        let mut parts = rest.splitn(3, ',');
        let tx = parts.next().and_then(|v| v.trim().parse().ok()).ok_or_else(invalid)?;
        let ty = parts.next().and_then(|v| v.trim().parse().ok()).ok_or_else(invalid)?;
        let perspective = parts.next().ok_or_else(invalid)?;
        let boost = boost.trim().parse().map_err(|_| invalid())?;
        Ok(Self::new(tx, ty, perspective, boost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_string() {
        let key = TileKey::new(-3, 12, "iso_SE_60_hires", 1);
        assert_eq!(key.to_string(), "-3,12,iso_SE_60_hires,1");
        assert_eq!("-3,12,iso_SE_60_hires,1".parse::<TileKey>().unwrap(), key);

        let odd = TileKey::new(0, 0, "a,b", 0);
        assert_eq!(odd.to_string().parse::<TileKey>().unwrap(), odd);

        assert!("1,2,p".parse::<TileKey>().is_err());
        assert!("x,2,p,0".parse::<TileKey>().is_err());
    }

    #[test]
    fn test_adjacent() {
        let key = TileKey::new(5, 5, "p", 2);
        let around = key.adjacent();
        assert!(!around.contains(&key));
        assert!(around.iter().all(|k| k.perspective == "p" && k.boost == 2));
        assert!(around.iter().all(|k| (k.tx - 5).abs() <= 1 && (k.ty - 5).abs() <= 1));
        assert_eq!(around[0], TileKey::new(4, 4, "p", 2));
    }

    #[test]
    fn test_adjacent_at_coordinate_limits() {
        let edge = TileKey::new(i32::MAX, i32::MIN, "p", 0);
        let around = edge.adjacent();
        assert_eq!(around[0], TileKey::new(i32::MAX - 1, i32::MAX, "p", 0));
        assert_eq!(around[7], TileKey::new(i32::MIN, i32::MIN + 1, "p", 0));
    }

    #[test]
    fn test_key_distinguishes_boost() {
        assert_ne!(TileKey::new(0, 0, "p", 0), TileKey::new(0, 0, "p", 1));
        assert_ne!(TileKey::new(0, 0, "p", 0), TileKey::new(0, 0, "q", 0));
    }
}
