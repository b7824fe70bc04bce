//! Two-layer rate limiting.
//!
//! The orchestrator consults [`RateLimiter::check_global`] first and
//! [`RateLimiter::check_per_actor`] second; a refused check consumes nothing.
//! Quota charged for a request that is not written after all is handed back
//! through [`RateLimiter::release`].

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use fleet_model::ActorId;

use crate::error::{LimitScope, RateLimitError};

#[async_trait]
pub trait RateLimiter: Send + Sync + 'static {
    /// System-wide ceiling, independent of the caller.
    async fn check_global(&self) -> Result<(), RateLimitError>;

    /// Fairness ceiling for one actor, weighted by the number of items submitted.
    async fn check_per_actor(&self, actor: &ActorId, items: usize) -> Result<(), RateLimitError>;

    /// Returns one global request and `items` of `actor`'s quota.
    async fn release(&self, actor: &ActorId, items: usize);
}

#[derive(Debug, Clone)]
pub struct WindowLimiterConfig {
    pub window: Duration,
    /// Batches accepted system-wide per window.
    pub global_limit: u32,
    /// Items one actor may submit per window.
    pub per_actor_items: u32,
}

impl Default for WindowLimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            global_limit: 100,
            per_actor_items: 200,
        }
    }
}

/// Fixed-window in-process limiter.
pub struct WindowLimiter {
    cfg: WindowLimiterConfig,
    state: Mutex<Window>,
}

struct Window {
    started: Instant,
    global: u32,
    per_actor: HashMap<ActorId, u32>,
}

impl WindowLimiter {
    pub fn new(cfg: WindowLimiterConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(Window {
                started: Instant::now(),
                global: 0,
                per_actor: HashMap::new(),
            }),
        }
    }

    /// Batches counted against the global ceiling in the current window.
    pub fn global_used(&self) -> u32 {
        self.window().global
    }

    /// Items counted against `actor` in the current window.
    pub fn actor_used(&self, actor: &ActorId) -> u32 {
        self.window().per_actor.get(actor).copied().unwrap_or(0)
    }

    /// Locks the state, rolling over to a fresh window when the current one expired.
    fn window(&self) -> MutexGuard<'_, Window> {
        let mut w = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if w.started.elapsed() >= self.cfg.window {
            w.started = Instant::now();
            w.global = 0;
            w.per_actor.clear();
        }
        w
    }

    fn exceeded(&self, w: &Window, scope: LimitScope) -> RateLimitError {
        RateLimitError::Exceeded {
            scope,
            retry_after: self.cfg.window.saturating_sub(w.started.elapsed()),
        }
    }
}

#[async_trait]
impl RateLimiter for WindowLimiter {
    async fn check_global(&self) -> Result<(), RateLimitError> {
        let mut w = self.window();
        if w.global >= self.cfg.global_limit {
            return Err(self.exceeded(&w, LimitScope::Global));
        }
        w.global += 1;
        Ok(())
    }

    async fn check_per_actor(&self, actor: &ActorId, items: usize) -> Result<(), RateLimitError> {
        let items = u32::try_from(items).unwrap_or(u32::MAX);
        let mut w = self.window();
        let used = w.per_actor.get(actor).copied().unwrap_or(0);
        if used.saturating_add(items) > self.cfg.per_actor_items {
            return Err(self.exceeded(&w, LimitScope::Actor));
        }
        w.per_actor.insert(actor.clone(), used + items);
        Ok(())
    }

    /// A refund that arrives after a rollover lands in the fresh window,
    /// where the counters saturate at zero.
    async fn release(&self, actor: &ActorId, items: usize) {
        let items = u32::try_from(items).unwrap_or(u32::MAX);
        let mut w = self.window();
        w.global = w.global.saturating_sub(1);
        if let Some(used) = w.per_actor.get_mut(actor) {
            *used = used.saturating_sub(items);
            if *used == 0 {
                w.per_actor.remove(actor);
            }
        }
    }
}
