use std::time::Duration;

/// Sizing and lifecycle settings of one [`TaskPool`](super::TaskPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of tasks queued or running at once; also the worker ceiling.
    pub capacity: usize,
    /// Low-water mark: idle workers are never retired below this count.
    ///
    /// At least one worker stays alive once spawned, even when this is zero.
    pub min_workers: usize,
    /// How long a worker may sit idle before it is retired.
    pub idle_expiry: Duration,
    /// Upper bound on waiting for in-flight work during shutdown.
    pub drain_timeout: Duration,
}

impl PoolConfig {
    /// Profile for short general-purpose tasks.
    pub fn general() -> Self {
        Self {
            capacity: 64,
            min_workers: 4,
            idle_expiry: Duration::from_secs(60),
            drain_timeout: Duration::from_secs(30),
        }
    }

    /// Profile for longer-lived remote-cluster operations.
    pub fn cluster() -> Self {
        Self {
            capacity: 16,
            min_workers: 2,
            idle_expiry: Duration::from_secs(300),
            drain_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_min_workers(mut self, min_workers: usize) -> Self {
        self.min_workers = min_workers;
        self
    }

    pub fn with_idle_expiry(mut self, idle_expiry: Duration) -> Self {
        self.idle_expiry = idle_expiry;
        self
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Workers that survive idle expiry.
    pub(crate) fn retained_workers(&self) -> usize {
        self.min_workers.clamp(1, self.capacity.max(1))
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::general()
    }
}

/// Point-in-time counters of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub name: &'static str,
    pub capacity: usize,
    /// Live workers, busy or idle.
    pub workers: usize,
    pub idle: usize,
    /// Submitted but not yet picked up.
    pub queued: usize,
    pub running: usize,
}
