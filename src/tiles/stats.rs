//! Per-map render counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default)]
pub struct RenderStatistics {
    rendered: AtomicU64,
    updated: AtomicU64,
    unchanged: AtomicU64,
    failed: AtomicU64,
    requeued: AtomicU64,
    render_millis: AtomicU64,
}

/// Point-in-time copy of [`RenderStatistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub rendered: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub failed: u64,
    pub requeued: u64,
    pub render_millis: u64,
}

impl StatisticsSnapshot {
    /// Mean render time of finished tiles.
    pub fn mean_render_time(&self) -> Option<Duration> {
        (self.rendered > 0).then(|| Duration::from_millis(self.render_millis / self.rendered))
    }
}

impl RenderStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A finished render reached the store; `changed` if it was written.
    pub fn record_render(&self, changed: bool, elapsed: Duration) {
        self.rendered.fetch_add(1, Ordering::Relaxed);
        let counter = if changed { &self.updated } else { &self.unchanged };
        counter.fetch_add(1, Ordering::Relaxed);
        self.render_millis.fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_requeue(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            rendered: self.rendered.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            render_millis: self.render_millis.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = RenderStatistics::new();
        assert_eq!(stats.snapshot().mean_render_time(), None);
        stats.record_render(true, Duration::from_millis(300));
        stats.record_render(false, Duration::from_millis(100));
        stats.record_failure();
        let snap = stats.snapshot();
        assert_eq!((snap.rendered, snap.updated, snap.unchanged, snap.failed), (2, 1, 1, 1));
        assert_eq!(snap.mean_render_time(), Some(Duration::from_millis(200)));
    }
}
