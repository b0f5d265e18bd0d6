//! Tile update notifications.

use parking_lot::Mutex;
use tracing::debug;

/// Receives a notification for every tile whose stored image changed.
pub trait UpdateSink: Send + Sync {
    fn push_update(&self, world: &str, tile_uri: &str);
}

/// One changed tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileUpdate {
    pub world: String,
    pub uri: String,
}

/// Records updates in order.
#[derive(Debug, Default)]
pub struct UpdateLog {
    updates: Mutex<Vec<TileUpdate>>,
}

impl UpdateLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<TileUpdate> {
        self.updates.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.updates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<TileUpdate> {
        std::mem::take(&mut *self.updates.lock())
    }
}

impl UpdateSink for UpdateLog {
    fn push_update(&self, world: &str, tile_uri: &str) {
        debug!(world, uri = tile_uri, "tile updated");
        self.updates.lock().push(TileUpdate { world: world.to_string(), uri: tile_uri.to_string() });
    }
}
