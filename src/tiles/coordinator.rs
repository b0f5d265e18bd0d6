//! Commit path for finished tile images.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info, warn};

use super::key::TileKey;
use super::notify::UpdateSink;
use super::queue::{RenderQueue, RetryLedger};
use super::stats::RenderStatistics;
use super::storage::{TileStorage, WriteLockScope};
use crate::render::RenderedImage;
use crate::util::{Error, Result};

/// What happened to a tile whose render failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Put back on the render queue.
    Requeued,
    /// Logged and given up on.
    Dropped,
}

/// Writes tiles of one map, once per change.
pub struct TileWriteCoordinator {
    world: String,
    map: String,
    storage: Arc<dyn TileStorage>,
    sink: Arc<dyn UpdateSink>,
    queue: Arc<dyn RenderQueue>,
    stats: Arc<RenderStatistics>,
    retries: RetryLedger,
    requeue_failed: bool,
}

impl TileWriteCoordinator {
    pub fn new(
        world: impl Into<String>,
        map: impl Into<String>,
        storage: Arc<dyn TileStorage>,
        sink: Arc<dyn UpdateSink>,
        queue: Arc<dyn RenderQueue>,
    ) -> Self {
        Self {
            world: world.into(),
            map: map.into(),
            storage,
            sink,
            queue,
            stats: Arc::new(RenderStatistics::new()),
            retries: RetryLedger::new(3),
            requeue_failed: true,
        }
    }

    /// Requeue retryable failures at most `max_attempts` times per tile.
    /// `enabled = false` drops every failure.
    pub fn with_requeue(mut self, enabled: bool, max_attempts: u32) -> Self {
        self.requeue_failed = enabled;
        self.retries = RetryLedger::new(max_attempts);
        self
    }

    pub fn with_statistics(mut self, stats: Arc<RenderStatistics>) -> Self {
        self.stats = stats;
        self
    }

    pub fn world(&self) -> &str {
        &self.world
    }

    pub fn map(&self) -> &str {
        &self.map
    }

    pub fn statistics(&self) -> &Arc<RenderStatistics> {
        &self.stats
    }

    pub fn retries(&self) -> &RetryLedger {
        &self.retries
    }

    /// Store `image` for `key` unless the stored tile already has its hash.
    ///
    /// Returns true if the image was written and a notification sent. The
    /// tile's write lock is held for the comparison and the write and is
    /// released on every path.
    pub fn commit(&self, key: &TileKey, image: &RenderedImage, started_at: SystemTime) -> Result<bool> {
        let hash = image.hash();
        let tile = self.storage.get_tile(&self.world, &self.map, key)?;
        let elapsed = SystemTime::now().duration_since(started_at).unwrap_or_default();

        let uri = {
            let _lock = WriteLockScope::acquire(&*tile);
            if tile.matches_hash(&hash)? {
                debug!(tx = key.tx, ty = key.ty, boost = key.boost, %hash, "tile unchanged");
                self.stats.record_render(false, elapsed);
                self.retries.clear(key);
                return Ok(false);
            }
            tile.write(hash, image, started_at)?;
            tile.uri()
        };

        self.sink.push_update(&self.world, &uri);
        self.stats.record_render(true, elapsed);
        self.retries.clear(key);
        debug!(tx = key.tx, ty = key.ty, boost = key.boost, %uri, "tile committed");
        Ok(true)
    }

    /// Requeue or drop a tile whose render or commit failed.
    pub fn handle_failure(&self, key: &TileKey, error: &Error) -> FailureOutcome {
        self.stats.record_failure();
        let kind = error.kind();
        if self.requeue_failed && error.is_retryable() {
            if self.retries.try_requeue(key) {
                info!(
                    tx = key.tx,
                    ty = key.ty,
                    boost = key.boost,
                    attempt = self.retries.attempts(key),
                    error = %error,
                    "requeueing failed tile"
                );
                self.stats.record_requeue();
                self.queue.push(key.clone());
                return FailureOutcome::Requeued;
            }
            warn!(
                tx = key.tx,
                ty = key.ty,
                boost = key.boost,
                attempts = self.retries.max_attempts(),
                error = %error,
                "tile failed too often, dropping"
            );
            // a later scheduling of this tile starts with a fresh budget
            self.retries.clear(key);
            return FailureOutcome::Dropped;
        }
        warn!(tx = key.tx, ty = key.ty, boost = key.boost, ?kind, error = %error, "tile render failed");
        FailureOutcome::Dropped
    }
}

impl std::fmt::Debug for TileWriteCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileWriteCoordinator")
            .field("world", &self.world)
            .field("map", &self.map)
            .field("requeue_failed", &self.requeue_failed)
            .finish_non_exhaustive()
    }
}
