//! Render queue seam and bounded retries.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;

use super::key::TileKey;

/// The host's queue of tiles waiting to be rendered.
pub trait RenderQueue: Send + Sync {
    fn push(&self, key: TileKey);
}

/// FIFO queue that holds each key at most once.
#[derive(Debug, Default)]
pub struct TileQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Debug, Default)]
struct QueueInner {
    order: VecDeque<TileKey>,
    queued: HashSet<TileKey>,
}

impl TileQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue unless already waiting. Returns whether it was added.
    pub fn enqueue(&self, key: TileKey) -> bool {
        let mut inner = self.inner.lock();
        if !inner.queued.insert(key.clone()) {
            return false;
        }
        inner.order.push_back(key);
        true
    }

    pub fn pop(&self) -> Option<TileKey> {
        let mut inner = self.inner.lock();
        let key = inner.order.pop_front()?;
        inner.queued.remove(&key);
        Some(key)
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.inner.lock().queued.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue strings of every waiting tile, front first.
    pub fn to_lines(&self) -> Vec<String> {
        self.inner.lock().order.iter().map(ToString::to_string).collect()
    }
}

impl RenderQueue for TileQueue {
    fn push(&self, key: TileKey) {
        self.enqueue(key);
    }
}

/// Counts requeues per tile so a tile that keeps failing is eventually dropped.
#[derive(Debug)]
pub struct RetryLedger {
    max_attempts: u32,
    attempts: Mutex<HashMap<TileKey, u32>>,
}

impl RetryLedger {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts, attempts: Mutex::default() }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Take one requeue for `key`; false once the budget is used up.
    pub fn try_requeue(&self, key: &TileKey) -> bool {
        let mut attempts = self.attempts.lock();
        let used = attempts.entry(key.clone()).or_insert(0);
        if *used >= self.max_attempts {
            return false;
        }
        *used += 1;
        true
    }

    pub fn attempts(&self, key: &TileKey) -> u32 {
        self.attempts.lock().get(key).copied().unwrap_or(0)
    }

    /// Forget a tile after it rendered successfully.
    pub fn clear(&self, key: &TileKey) {
        self.attempts.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_dedups() {
        let queue = TileQueue::new();
        let a = TileKey::new(0, 0, "p", 0);
        assert!(queue.enqueue(a.clone()));
        assert!(!queue.enqueue(a.clone()));
        queue.push(TileKey::new(1, 0, "p", 0));
        assert_eq!(queue.to_lines(), vec!["0,0,p,0", "1,0,p,0"]);
        assert_eq!(queue.pop(), Some(a.clone()));
        assert!(!queue.contains(&a));
        assert!(queue.enqueue(a));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_retry_budget() {
        let ledger = RetryLedger::new(2);
        let key = TileKey::new(3, 4, "p", 0);
        assert!(ledger.try_requeue(&key));
        assert!(ledger.try_requeue(&key));
        assert!(!ledger.try_requeue(&key));
        assert_eq!(ledger.attempts(&key), 2);
        ledger.clear(&key);
        assert!(ledger.try_requeue(&key));

        assert!(!RetryLedger::new(0).try_requeue(&key));
    }
}
