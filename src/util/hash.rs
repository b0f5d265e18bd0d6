//! Content digests for tile deduplication and region checksums.

use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};

/// 128-bit MD5 digest of raw content.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Default)]
pub struct ContentHash(pub [u8; 16]);

impl ContentHash {
    /// Digest a byte buffer.
    #[inline]
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Digest bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex form, as sent to the render farm.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 32 || !s.is_ascii() {
            return Err(format!("expected 32 hex digits, got {}", s.len()));
        }
        let mut out = [0u8; 16];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|e| format!("invalid hex digest: {e}"))?;
        }
        Ok(Self(out))
    }
}
