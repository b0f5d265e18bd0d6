//! Render worker pool with a CPU duty cycle.

use std::time::Duration;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::util::{Error, Result};

/// Dedicated rayon pool for one backend.
pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tracemap-render-{i}"))
            .build()
            .map_err(|e| Error::config(format!("cannot start {threads} render threads: {e}")))?;
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `op` inside the pool; parallel iterators in it use the pool's threads.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("threads", &self.threads).finish()
    }
}

/// Keeps average CPU use near `load` percent by idling after work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycle {
    load: u8,
}

impl DutyCycle {
    /// `load` is clamped to 1..=100.
    pub fn new(load: u8) -> Self {
        Self { load: load.clamp(1, 100) }
    }

    pub fn load(&self) -> u8 {
        self.load
    }

    /// Idle time owed after `busy` of work.
    pub fn pause_for(&self, busy: Duration) -> Duration {
        if self.load >= 100 {
            return Duration::ZERO;
        }
        busy * u32::from(100 - self.load) / u32::from(self.load)
    }

    pub fn pause(&self, busy: Duration) {
        let idle = self.pause_for(busy);
        if !idle.is_zero() {
            std::thread::sleep(idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duty_cycle() {
        let busy = Duration::from_millis(100);
        assert_eq!(DutyCycle::new(100).pause_for(busy), Duration::ZERO);
        assert_eq!(DutyCycle::new(50).pause_for(busy), Duration::from_millis(100));
        assert_eq!(DutyCycle::new(25).pause_for(busy), Duration::from_millis(300));
        assert_eq!(DutyCycle::new(0).load(), 1);
        assert_eq!(DutyCycle::new(200).load(), 100);
    }

    #[test]
    fn test_pool_runs_on_own_threads() {
        let pool = WorkerPool::new(2).unwrap();
        let name = pool.install(|| std::thread::current().name().map(str::to_string));
        assert!(name.unwrap().starts_with("tracemap-render-"));
    }
}
