//! Worker side of a pool: picks jobs from the shared queue, re-checks the
//! bound context, runs the task and contains panics.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::{Mutex, OwnedSemaphorePermit, mpsc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, trace};

use crate::metrics::{MetricsHandle, TaskOutcome};
use crate::pool::{
    config::PoolConfig,
    panic::{PanicHandler, PanicReport, panic_message},
};
use taskvisor::TaskRef;

/// Queued unit of work. Holds its slot until dropped.
pub(crate) struct Job {
    pub(crate) task: TaskRef,
    pub(crate) ctx: CancellationToken,
    pub(crate) _slot: OwnedSemaphorePermit,
}

/// State shared between the pool handle and its workers.
pub(crate) struct Shared {
    pub(crate) name: &'static str,
    pub(crate) cfg: PoolConfig,
    pub(crate) rx: Mutex<mpsc::Receiver<Job>>,
    pub(crate) tracker: TaskTracker,
    pub(crate) workers: AtomicUsize,
    pub(crate) idle: AtomicUsize,
    pub(crate) queued: AtomicUsize,
    pub(crate) running: AtomicUsize,
    pub(crate) next_worker_id: AtomicUsize,
    pub(crate) panic_handler: PanicHandler,
    pub(crate) metrics: MetricsHandle,
}

impl Shared {
    /// Spawns a worker when queued jobs outnumber idle workers.
    pub(crate) fn maybe_spawn(self: &Arc<Self>) {
        let queued = self.queued.load(Ordering::Acquire);
        let idle = self.idle.load(Ordering::Acquire);
        if queued <= idle || !self.reserve_worker() {
            return;
        }
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        self.tracker.spawn(worker_loop(Arc::clone(self), id));
    }

    /// Reserves a worker slot if the ceiling allows it.
    fn reserve_worker(&self) -> bool {
        let mut cur = self.workers.load(Ordering::Acquire);
        while cur < self.cfg.capacity {
            match self.workers.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
        false
    }

    /// Retires the calling worker unless that would drop below the low-water mark.
    fn try_retire(&self) -> bool {
        let keep = self.cfg.retained_workers();
        let mut cur = self.workers.load(Ordering::Acquire);
        while cur > keep {
            match self.workers.compare_exchange_weak(
                cur,
                cur - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
        false
    }

    pub(crate) async fn execute(&self, job: Job) {
        let task_name = job.task.name().to_string();

        if job.ctx.is_cancelled() {
            debug!(pool = self.name, task = %task_name, "task skipped: context cancelled while queued");
            self.metrics.task_finished(self.name, TaskOutcome::Skipped);
            return;
        }

        self.running.fetch_add(1, Ordering::AcqRel);
        self.metrics.task_started(self.name);

        let outcome = match tokio::spawn(job.task.spawn(job.ctx.clone())).await {
            Ok(Ok(())) => {
                trace!(pool = self.name, task = %task_name, "task completed");
                TaskOutcome::Succeeded
            }
            Ok(Err(e)) => {
                debug!(
                    pool = self.name,
                    task = %task_name,
                    label = e.as_label(),
                    error = %e,
                    "task returned an error"
                );
                TaskOutcome::Failed
            }
            Err(je) if je.is_panic() => {
                let report = PanicReport {
                    pool: self.name,
                    task: task_name,
                    message: panic_message(je.into_panic()),
                };
                (self.panic_handler)(&report);
                TaskOutcome::Panicked
            }
            Err(_) => {
                debug!(pool = self.name, task = %task_name, "task aborted by runtime");
                TaskOutcome::Failed
            }
        };

        self.running.fetch_sub(1, Ordering::AcqRel);
        self.metrics.task_finished(self.name, outcome);
    }
}

/// Runs until the queue is closed and drained, or until idle expiry retires it.
///
/// Spawned only through [`Shared::maybe_spawn`], which reserves the slot.
async fn worker_loop(shared: Arc<Shared>, worker_id: usize) {
    trace!(pool = shared.name, worker_id, "worker started");

    loop {
        shared.idle.fetch_add(1, Ordering::AcqRel);
        let next = tokio::time::timeout(shared.cfg.idle_expiry, async {
            let mut rx = shared.rx.lock().await;
            rx.recv().await
        })
        .await;
        shared.idle.fetch_sub(1, Ordering::AcqRel);

        match next {
            Ok(Some(job)) => {
                shared.queued.fetch_sub(1, Ordering::AcqRel);
                shared.execute(job).await
            }
            Ok(None) => {
                shared.workers.fetch_sub(1, Ordering::AcqRel);
                trace!(pool = shared.name, worker_id, "worker stopped: queue closed");
                return;
            }
            Err(_) => {
                if shared.try_retire() {
                    trace!(pool = shared.name, worker_id, "idle worker retired");
                    // a job may have landed between the timeout and the retirement
                    shared.maybe_spawn();
                    return;
                }
            }
        }
    }
}
