//! Child ticket execution.
//!
//! ```text
//! dispatch(batch) ──► detached task on General
//!                       └─ for each Pending child:
//!                            detached task on Cluster
//!                              ├─ start_child      (Pending -> Running, attempts += 1)
//!                              ├─ ChildExecutor::execute
//!                              └─ finish_child     (Running -> Succeeded | Failed)
//! ```
//!
//! A child whose task is skipped (shutdown before pickup) or that was
//! cancelled while queued is never claimed and keeps its status. Once
//! claimed, a child is always finished: an executor panic is recorded as a
//! failure so the child stays eligible for `requeue_failed`.

use std::sync::Arc;

use async_trait::async_trait;
use fleet_core::{PoolError, PoolName, TaskError, TaskFn, TaskPools, TaskRef, panic_message};
use fleet_model::{BatchId, BatchTicket, ChildStatus, ChildTicket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::TicketStore;

/// Applies a batch operation to one resource in a remote cluster.
#[async_trait]
pub trait ChildExecutor: Send + Sync + 'static {
    async fn execute(
        &self,
        ctx: CancellationToken,
        batch: &BatchTicket,
        child: &ChildTicket,
    ) -> Result<(), TaskError>;
}

/// Dispatches pending children of a batch through the task pools.
#[derive(Clone)]
pub struct BatchRunner {
    pools: Arc<TaskPools>,
    store: Arc<dyn TicketStore>,
    executor: Arc<dyn ChildExecutor>,
}

impl BatchRunner {
    pub fn new(
        pools: Arc<TaskPools>,
        store: Arc<dyn TicketStore>,
        executor: Arc<dyn ChildExecutor>,
    ) -> Self {
        Self {
            pools,
            store,
            executor,
        }
    }

    /// Schedules every pending child of `batch` and returns without waiting.
    pub async fn dispatch(&self, batch: BatchId) -> Result<(), PoolError> {
        let runner = self.clone();
        let task = TaskFn::arc(
            format!("batch-dispatch-{batch}"),
            move |ctx: CancellationToken| {
                let runner = runner.clone();
                async move { runner.fan_out(ctx, batch).await }
            },
        );
        self.pools.submit_detached(PoolName::General, task).await
    }

    async fn fan_out(&self, ctx: CancellationToken, batch: BatchId) -> Result<(), TaskError> {
        let parent = match self.store.get(&batch).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                return Err(TaskError::Fatal {
                    reason: format!("batch {batch} vanished"),
                });
            }
            Err(e) => return Err(store_failure(e)),
        };
        let children = self.store.children(&batch).await.map_err(store_failure)?;

        let parent = Arc::new(parent);
        let mut scheduled = 0usize;
        for child in children.into_iter().filter(|c| c.status == ChildStatus::Pending) {
            if ctx.is_cancelled() {
                return Err(TaskError::Canceled);
            }
            let task = self.child_task(Arc::clone(&parent), child);
            match self.pools.submit_detached(PoolName::Cluster, task).await {
                Ok(()) => scheduled += 1,
                Err(e) => {
                    warn!(batch_id = %batch, error = %e, scheduled, "child dispatch stopped");
                    return Err(TaskError::Canceled);
                }
            }
        }
        info!(batch_id = %batch, scheduled, "batch dispatched");
        Ok(())
    }

    fn child_task(&self, parent: Arc<BatchTicket>, child: ChildTicket) -> TaskRef {
        let store = Arc::clone(&self.store);
        let executor = Arc::clone(&self.executor);
        let child = Arc::new(child);
        TaskFn::arc(
            format!("batch-child-{}-{}", parent.id, child.seq),
            move |ctx: CancellationToken| {
                let (store, executor) = (Arc::clone(&store), Arc::clone(&executor));
                let (parent, child) = (Arc::clone(&parent), Arc::clone(&child));
                async move { run_child(ctx, store, executor, parent, &child).await }
            },
        )
    }
}

async fn run_child(
    ctx: CancellationToken,
    store: Arc<dyn TicketStore>,
    executor: Arc<dyn ChildExecutor>,
    parent: Arc<BatchTicket>,
    child: &ChildTicket,
) -> Result<(), TaskError> {
    let claimed = match store.start_child(&child.id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            debug!(batch_id = %parent.id, seq = child.seq, "child no longer pending; skipped");
            return Ok(());
        }
        Err(e) => return Err(store_failure(e)),
    };

    let outcome = execute_contained(ctx, executor, Arc::clone(&parent), claimed.clone()).await;
    if let Err(reason) = &outcome {
        warn!(
            batch_id = %parent.id,
            seq = claimed.seq,
            resource = %claimed.resource_id,
            attempt = claimed.attempts,
            error = %reason,
            "child failed"
        );
    }

    let updated = store
        .finish_child(&claimed.id, outcome)
        .await
        .map_err(store_failure)?;
    if updated.status.is_final() {
        info!(
            batch_id = %updated.id,
            status = updated.status.as_str(),
            succeeded = updated.counts.succeeded,
            failed = updated.counts.failed,
            cancelled = updated.counts.cancelled,
            "batch settled"
        );
    }
    Ok(())
}

/// Runs the executor on its own runtime task so a panic surfaces as a
/// `JoinError` instead of unwinding past `finish_child`.
async fn execute_contained(
    ctx: CancellationToken,
    executor: Arc<dyn ChildExecutor>,
    parent: Arc<BatchTicket>,
    child: ChildTicket,
) -> Result<(), String> {
    let handle =
        tokio::spawn(async move { executor.execute(ctx, &parent, &child).await });
    match handle.await {
        Ok(res) => res.map_err(|e| e.to_string()),
        Err(je) if je.is_panic() => Err(format!(
            "executor panicked: {}",
            panic_message(je.into_panic())
        )),
        Err(je) => Err(format!("executor aborted: {je}")),
    }
}

fn store_failure(e: StoreError) -> TaskError {
    TaskError::Fail {
        reason: e.to_string(),
    }
}
