//! # Bounded, context-aware task pool.
//!
//! A [`TaskPool`] owns at most `capacity` worker slots. Each submission holds a
//! slot from the moment it is queued until its task finishes or is skipped,
//! so `submit` suspends the caller while the pool is saturated.
//!
//! ## Context checks
//! ```text
//! submit(ctx) ─► ctx done?  ──yes──► Err(Cancelled)        (nothing queued)
//!      │ no
//!      ▼
//! wait for slot ─► ctx cancelled meanwhile? ──► Err(Cancelled)
//!      │
//!      ▼
//! queue ─► worker picks job ─► ctx done? ──yes──► skip (debug log)
//!                                  │ no
//!                                  ▼
//!                            task.spawn(ctx)
//! ```
//!
//! ## Workers
//! Workers are spawned lazily when queued jobs outnumber idle workers and are
//! retired after `idle_expiry` without work, down to the configured low-water
//! mark. A panicking task is reported to the [`PanicHandler`]; the worker keeps
//! serving the queue.
//!
//! ## Shutdown
//! [`TaskPool::shutdown`] closes the queue, lets workers drain what is already
//! queued, and waits at most `drain_timeout` for them.

mod config;
mod panic;
mod worker;

pub use config::{PoolConfig, PoolStats};
pub use panic::{PanicHandler, PanicReport, panic_message};
pub(crate) use panic::log_panic as log_panic_handler;

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::{Mutex as AsyncMutex, Semaphore, mpsc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::error::PoolError;
use crate::metrics::{MetricsHandle, NoopMetrics};
use taskvisor::TaskRef;
use worker::{Job, Shared};

pub struct TaskPool {
    shared: Arc<Shared>,
    slots: Arc<Semaphore>,
    queue: Mutex<Option<mpsc::Sender<Job>>>,
}

impl TaskPool {
    pub fn new(name: &'static str, cfg: PoolConfig) -> Self {
        Self::with_hooks(name, cfg, panic::log_panic(), NoopMetrics::handle())
    }

    pub fn with_hooks(
        name: &'static str,
        cfg: PoolConfig,
        panic_handler: PanicHandler,
        metrics: MetricsHandle,
    ) -> Self {
        let cfg = PoolConfig {
            capacity: cfg.capacity.max(1),
            ..cfg
        };
        let (tx, rx) = mpsc::channel(cfg.capacity);
        let slots = Arc::new(Semaphore::new(cfg.capacity));

        let shared = Arc::new(Shared {
            name,
            cfg,
            rx: AsyncMutex::new(rx),
            tracker: TaskTracker::new(),
            workers: AtomicUsize::new(0),
            idle: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            next_worker_id: AtomicUsize::new(0),
            panic_handler,
            metrics,
        });

        Self {
            shared,
            slots,
            queue: Mutex::new(Some(tx)),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.cfg
    }

    /// Queues `task` bound to `ctx`.
    ///
    /// Returns immediately with [`PoolError::Cancelled`] when `ctx` is already
    /// done; otherwise waits for a free slot. Task-level errors are not
    /// reported here.
    pub async fn submit(&self, ctx: &CancellationToken, task: TaskRef) -> Result<(), PoolError> {
        if ctx.is_cancelled() {
            return Err(PoolError::Cancelled);
        }
        let sender = self.sender()?;

        let slot = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(PoolError::Cancelled),
            slot = Arc::clone(&self.slots).acquire_owned() => slot.map_err(|_| self.closed())?,
        };

        let job = Job {
            task,
            ctx: ctx.clone(),
            _slot: slot,
        };
        self.shared.queued.fetch_add(1, Ordering::AcqRel);
        if sender.send(job).await.is_err() {
            self.shared.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(self.closed());
        }
        self.shared.maybe_spawn();
        Ok(())
    }

    /// Closes the pool and waits up to `drain_timeout` for workers to finish.
    ///
    /// Returns `true` when every worker stopped in time. Calling it again is a
    /// no-op that reports the current drain state.
    pub async fn shutdown(&self) -> bool {
        let sender = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            debug!(pool = self.name(), "pool closing");
        }
        drop(sender);
        self.slots.close();
        self.shared.tracker.close();

        let drain = self.shared.cfg.drain_timeout;
        match tokio::time::timeout(drain, self.shared.tracker.wait()).await {
            Ok(()) => {
                info!(pool = self.name(), "pool drained");
                true
            }
            Err(_) => {
                let stats = self.stats();
                warn!(
                    pool = self.name(),
                    drain_ms = drain.as_millis() as u64,
                    running = stats.running,
                    queued = stats.queued,
                    "pool did not drain within timeout; abandoning remaining work"
                );
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    pub fn stats(&self) -> PoolStats {
        let s = &self.shared;
        PoolStats {
            name: s.name,
            capacity: s.cfg.capacity,
            workers: s.workers.load(Ordering::Acquire),
            idle: s.idle.load(Ordering::Acquire),
            queued: s.queued.load(Ordering::Acquire),
            running: s.running.load(Ordering::Acquire),
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Job>, PoolError> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| self.closed())
    }

    #[inline]
    fn closed(&self) -> PoolError {
        PoolError::Closed { pool: self.name() }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;
    use crate::metrics::{MetricsBackend, TaskOutcome};
    use crate::{TaskError, TaskFn};

    fn small(capacity: usize) -> PoolConfig {
        PoolConfig::general()
            .with_capacity(capacity)
            .with_min_workers(1)
            .with_idle_expiry(Duration::from_millis(50))
            .with_drain_timeout(Duration::from_secs(2))
    }

    fn signal_task(tx: oneshot::Sender<()>) -> TaskRef {
        let tx = Mutex::new(Some(tx));
        TaskFn::arc("signal", move |_ctx: CancellationToken| {
            let tx = tx.lock().unwrap().take();
            async move {
                if let Some(tx) = tx {
                    let _ = tx.send(());
                }
                Ok(())
            }
        })
    }

    /// Task that reports start and then waits for `gate` to be cancelled.
    fn hold_task(gate: &CancellationToken, started: &Arc<Semaphore>) -> TaskRef {
        let gate = gate.clone();
        let started = Arc::clone(started);
        TaskFn::arc("hold", move |_ctx: CancellationToken| {
            let gate = gate.clone();
            let started = Arc::clone(&started);
            async move {
                started.add_permits(1);
                gate.cancelled().await;
                Ok(())
            }
        })
    }

    fn flag_task(ran: &Arc<AtomicBool>) -> TaskRef {
        let ran = Arc::clone(ran);
        TaskFn::arc("probe", move |_ctx: CancellationToken| {
            let ran = Arc::clone(&ran);
            async move {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[derive(Default)]
    struct Outcomes(Mutex<Vec<TaskOutcome>>);

    impl MetricsBackend for Outcomes {
        fn task_finished(&self, _pool: &str, outcome: TaskOutcome) {
            self.0.lock().unwrap().push(outcome);
        }
    }

    #[tokio::test]
    async fn runs_submitted_task() {
        let pool = TaskPool::new("test", small(2));
        let (tx, rx) = oneshot::channel();

        pool.submit(&CancellationToken::new(), signal_task(tx))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("task should run")
            .unwrap();
        assert!(pool.shutdown().await);
    }

    #[tokio::test]
    async fn cancelled_context_fails_fast_even_when_saturated() {
        let pool = TaskPool::new("test", small(1));
        let gate = CancellationToken::new();
        let started = Arc::new(Semaphore::new(0));
        pool.submit(&CancellationToken::new(), hold_task(&gate, &started))
            .await
            .unwrap();
        started.acquire().await.unwrap().forget();

        let ctx = CancellationToken::new();
        ctx.cancel();
        let ran = Arc::new(AtomicBool::new(false));
        let res = tokio::time::timeout(
            Duration::from_millis(100),
            pool.submit(&ctx, flag_task(&ran)),
        )
        .await
        .expect("submit must not block on a cancelled context");
        assert_eq!(res, Err(PoolError::Cancelled));

        gate.cancel();
        assert!(pool.shutdown().await);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn waiting_submit_observes_cancellation() {
        let pool = TaskPool::new("test", small(1));
        let gate = CancellationToken::new();
        let started = Arc::new(Semaphore::new(0));
        pool.submit(&CancellationToken::new(), hold_task(&gate, &started))
            .await
            .unwrap();
        started.acquire().await.unwrap().forget();

        let ctx = CancellationToken::new();
        let canceller = ctx.clone();
        let ran = Arc::new(AtomicBool::new(false));
        let (res, _) = tokio::join!(pool.submit(&ctx, flag_task(&ran)), async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });
        assert_eq!(res, Err(PoolError::Cancelled));

        gate.cancel();
        assert!(pool.shutdown().await);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn worker_skips_job_whose_context_died_in_queue() {
        let outcomes = Arc::new(Outcomes::default());
        let pool = TaskPool::with_hooks("test", small(1), panic::log_panic(), outcomes.clone());

        let ctx = CancellationToken::new();
        let slot = Arc::clone(&pool.slots).acquire_owned().await.unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let job = Job {
            task: flag_task(&ran),
            ctx: ctx.clone(),
            _slot: slot,
        };
        ctx.cancel();
        pool.shared.execute(job).await;

        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(*outcomes.0.lock().unwrap(), vec![TaskOutcome::Skipped]);
        // the slot went back with the dropped job
        assert_eq!(pool.slots.available_permits(), 1);
    }

    #[tokio::test]
    async fn panic_is_contained_and_worker_keeps_serving() {
        let reports = Arc::new(Mutex::new(Vec::<PanicReport>::new()));
        let handler: PanicHandler = {
            let reports = Arc::clone(&reports);
            Arc::new(move |r: &PanicReport| reports.lock().unwrap().push(r.clone()))
        };
        let pool = TaskPool::with_hooks("test", small(1), handler, NoopMetrics::handle());

        let bomb = TaskFn::arc("bomb", |_ctx: CancellationToken| async move {
            if true {
                panic!("boom");
            }
            Ok::<(), TaskError>(())
        });
        pool.submit(&CancellationToken::new(), bomb).await.unwrap();

        let (tx, rx) = oneshot::channel();
        pool.submit(&CancellationToken::new(), signal_task(tx))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("pool must keep working after a panic")
            .unwrap();

        assert!(pool.shutdown().await);
        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].task, "bomb");
        assert_eq!(reports[0].message, "boom");
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let pool = TaskPool::new("test", small(1));
        assert!(pool.shutdown().await);
        assert!(pool.is_closed());

        let ran = Arc::new(AtomicBool::new(false));
        let res = pool.submit(&CancellationToken::new(), flag_task(&ran)).await;
        assert_eq!(res, Err(PoolError::Closed { pool: "test" }));
        assert!(pool.shutdown().await);
    }

    #[tokio::test]
    async fn drain_is_bounded_by_timeout() {
        let pool = TaskPool::new(
            "test",
            small(1).with_drain_timeout(Duration::from_millis(50)),
        );
        let gate = CancellationToken::new();
        let started = Arc::new(Semaphore::new(0));
        pool.submit(&CancellationToken::new(), hold_task(&gate, &started))
            .await
            .unwrap();
        started.acquire().await.unwrap().forget();

        let begun = std::time::Instant::now();
        assert!(!pool.shutdown().await);
        assert!(begun.elapsed() < Duration::from_secs(1));
        gate.cancel();
    }

    #[tokio::test]
    async fn idle_workers_retire_down_to_low_water_mark() {
        let pool = TaskPool::new("test", small(4).with_min_workers(1));
        let gate = CancellationToken::new();
        let started = Arc::new(Semaphore::new(0));

        for _ in 0..4 {
            pool.submit(&CancellationToken::new(), hold_task(&gate, &started))
                .await
                .unwrap();
        }
        for _ in 0..4 {
            started.acquire().await.unwrap().forget();
        }
        let stats = pool.stats();
        assert_eq!(stats.workers, 4);
        assert_eq!(stats.running, 4);

        gate.cancel();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(pool.stats().workers, 1);

        assert!(pool.shutdown().await);
    }
}
