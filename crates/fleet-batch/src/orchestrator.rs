//! # Batch Ticket Orchestrator
//!
//! `execute` checks, in order and short-circuiting:
//!
//! 1. structure: idempotency key, batch type/operation pair, items;
//! 2. idempotency fast path: an existing parent is returned as is, and no
//!    quota is consumed;
//! 3. size policy for the `(batch type, operation)` pair;
//! 4. global rate limit, then per-actor rate limit weighted by item count;
//! 5. atomic fan-out of parent and children (idempotency re-checked inside).
//!
//! Steps 4 and 5 run while holding the in-flight slot of the idempotency key,
//! and the store is consulted again once the slot is held, so concurrent
//! duplicates are charged once. Nothing is written before step 5, and step 5
//! writes all rows or none. Quota charged for a request that ends up not
//! written is released.

use std::{sync::Arc, time::SystemTime};

use fleet_core::{MetricsHandle, NoopMetrics};
use fleet_model::{
    ActorId, BatchCounts, BatchId, BatchRequest, BatchStatus, BatchTicket, BatchType, ChildId,
    ChildStatus, ChildTicket, Operation, TrackingHandle,
};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{BatchError, StoreError};
use crate::inflight::InFlight;
use crate::limiter::RateLimiter;
use crate::policy::SizePolicy;
use crate::runner::BatchRunner;
use crate::store::{CreateOutcome, NewBatch, TicketStore};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Prefix of the polling location handed out in tracking handles.
    pub poll_base_path: String,
    /// Suggested delay between two polls.
    pub retry_after_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_base_path: "/api/v1/batch-tickets".to_string(),
            retry_after_secs: 5,
        }
    }
}

pub struct Orchestrator {
    cfg: OrchestratorConfig,
    store: Arc<dyn TicketStore>,
    limiter: Arc<dyn RateLimiter>,
    policy: SizePolicy,
    runner: Option<BatchRunner>,
    metrics: MetricsHandle,
    inflight: InFlight<(ActorId, BatchType, String)>,
}

impl Orchestrator {
    pub fn new(
        cfg: OrchestratorConfig,
        store: Arc<dyn TicketStore>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            cfg,
            store,
            limiter,
            policy: SizePolicy::default(),
            runner: None,
            metrics: NoopMetrics::handle(),
            inflight: InFlight::new(),
        }
    }

    pub fn with_policy(mut self, policy: SizePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attaches the runner that executes children once a batch is approved.
    pub fn with_runner(mut self, runner: BatchRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Accepts a batch request and returns its tracking handle.
    ///
    /// Resubmitting the same `(actor, batch type, request id)` returns the
    /// handle of the existing batch.
    #[instrument(level = "debug", skip_all, fields(actor = %actor, request_id = %request.request_id))]
    pub async fn execute(
        &self,
        request: &BatchRequest,
        actor: &ActorId,
    ) -> Result<TrackingHandle, BatchError> {
        match self.try_execute(request, actor).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.metrics.batch_rejected(e.as_label());
                debug!(reason = e.as_label(), error = %e, "batch request refused");
                Err(e)
            }
        }
    }

    async fn try_execute(
        &self,
        request: &BatchRequest,
        actor: &ActorId,
    ) -> Result<TrackingHandle, BatchError> {
        let (batch_type, op) = validate(request)?;
        let request_id = request.request_id.trim();

        if let Some(existing) = self
            .store
            .find_by_idempotency_key(actor, batch_type, request_id)
            .await?
        {
            debug!(batch_id = %existing.id, "duplicate submission");
            return Ok(self.handle(&existing));
        }

        let requested = request.items.len();
        let limit = self.policy.limit(batch_type, op).ok_or_else(|| {
            BatchError::InvalidRequest(format!("no size limit defined for {batch_type}/{op}"))
        })?;
        if requested > limit {
            return Err(BatchError::TooLarge { limit, requested });
        }

        let _slot = self
            .inflight
            .acquire((actor.clone(), batch_type, request_id.to_string()))
            .await;
        if let Some(existing) = self
            .store
            .find_by_idempotency_key(actor, batch_type, request_id)
            .await?
        {
            debug!(batch_id = %existing.id, "duplicate submission settled while queued");
            return Ok(self.handle(&existing));
        }

        self.limiter.check_global().await?;
        if let Err(e) = self.limiter.check_per_actor(actor, requested).await {
            self.limiter.release(actor, 0).await;
            return Err(e.into());
        }

        let batch = new_batch(request, request_id, batch_type, op, actor);
        let created = self.store.create_parent_and_children(batch).await;
        if !matches!(created, Ok(CreateOutcome::Created(_))) {
            self.limiter.release(actor, requested).await;
        }
        match created {
            Ok(CreateOutcome::Created(ticket)) => {
                self.metrics.batch_accepted(batch_type.as_str(), requested);
                info!(
                    batch_id = %ticket.id,
                    batch_type = batch_type.as_str(),
                    operation = op.as_str(),
                    items = requested,
                    "batch accepted"
                );
                Ok(self.handle(&ticket))
            }
            Ok(CreateOutcome::Existing(ticket)) => {
                debug!(batch_id = %ticket.id, "duplicate submission resolved inside the write");
                Ok(self.handle(&ticket))
            }
            Err(StoreError::Constraint(msg)) => Err(BatchError::InvalidRequest(msg)),
            Err(e) => {
                error!(error = %e, "batch fan-out failed");
                Err(e.into())
            }
        }
    }

    /// Moves a batch out of `PendingApproval` and dispatches its children.
    pub async fn approve(
        &self,
        batch: &BatchId,
        approver: &ActorId,
    ) -> Result<TrackingHandle, BatchError> {
        let ticket = match self.store.approve(batch, approver).await {
            Ok(t) => t,
            Err(StoreError::Constraint(msg)) => return Err(BatchError::InvalidRequest(msg)),
            Err(e) => return Err(e.into()),
        };
        info!(batch_id = %batch, approver = %approver, "batch approved");
        self.dispatch(batch).await;
        Ok(self.handle(&ticket))
    }

    /// Puts every failed child back to pending. Returns the number requeued.
    pub async fn requeue_failed(&self, batch: &BatchId, actor: &ActorId) -> Result<u32, BatchError> {
        let parent = self.owned(batch, actor).await?;
        let n = self.store.requeue_failed_children(batch).await?;
        if n > 0 {
            info!(batch_id = %batch, requeued = n, "failed children requeued");
            if parent.status != BatchStatus::PendingApproval {
                self.dispatch(batch).await;
            }
        }
        Ok(n)
    }

    /// Cancels every child not yet started. Returns the number cancelled.
    pub async fn cancel_pending(&self, batch: &BatchId, actor: &ActorId) -> Result<u32, BatchError> {
        self.owned(batch, actor).await?;
        let n = self.store.cancel_pending_children(batch).await?;
        if n > 0 {
            info!(batch_id = %batch, cancelled = n, "pending children cancelled");
        }
        Ok(n)
    }

    pub async fn get(&self, batch: &BatchId) -> Result<BatchTicket, BatchError> {
        self.store
            .get(batch)
            .await?
            .ok_or_else(|| BatchError::NotFound(batch.to_string()))
    }

    /// Children of `batch` in submission order.
    pub async fn children(&self, batch: &BatchId) -> Result<Vec<ChildTicket>, BatchError> {
        Ok(self.store.children(batch).await?)
    }

    pub fn handle(&self, ticket: &BatchTicket) -> TrackingHandle {
        TrackingHandle {
            batch_id: ticket.id,
            status: ticket.status,
            poll_url: format!(
                "{}/{}",
                self.cfg.poll_base_path.trim_end_matches('/'),
                ticket.id
            ),
            retry_after_secs: self.cfg.retry_after_secs,
        }
    }

    async fn owned(&self, batch: &BatchId, actor: &ActorId) -> Result<BatchTicket, BatchError> {
        let parent = self.get(batch).await?;
        if &parent.creator != actor {
            return Err(BatchError::Forbidden(format!(
                "batch {batch} belongs to another actor"
            )));
        }
        Ok(parent)
    }

    async fn dispatch(&self, batch: &BatchId) {
        let Some(runner) = &self.runner else {
            return;
        };
        if let Err(e) = runner.dispatch(*batch).await {
            // children stay pending and are picked up by the next dispatch
            warn!(batch_id = %batch, error = %e, "batch dispatch refused");
        }
    }
}

fn validate(request: &BatchRequest) -> Result<(BatchType, Operation), BatchError> {
    if request.request_id.trim().is_empty() {
        return Err(BatchError::InvalidRequest("request id is required".into()));
    }
    let pair = BatchType::parse_pair(&request.batch_type, &request.operation)
        .map_err(|e| BatchError::InvalidRequest(e.to_string()))?;
    if request.items.is_empty() {
        return Err(BatchError::InvalidRequest(
            "at least one item is required".into(),
        ));
    }
    for (i, item) in request.items.iter().enumerate() {
        if item.resource_type.trim().is_empty() || item.resource_id.trim().is_empty() {
            return Err(BatchError::InvalidRequest(format!(
                "item {}: resource type and id are required",
                i + 1
            )));
        }
    }
    Ok(pair)
}

fn new_batch(
    request: &BatchRequest,
    request_id: &str,
    batch_type: BatchType,
    operation: Operation,
    actor: &ActorId,
) -> NewBatch {
    let id = BatchId::generate();
    let now = SystemTime::now();
    let children: Vec<ChildTicket> = request
        .items
        .iter()
        .zip(1u32..)
        .map(|(item, seq)| ChildTicket {
            id: ChildId::generate(),
            batch_id: id,
            seq,
            resource_type: item.resource_type.clone(),
            resource_id: item.resource_id.clone(),
            status: ChildStatus::Pending,
            attempts: 0,
            error: None,
            updated_at: now,
        })
        .collect();

    let parent = BatchTicket {
        id,
        batch_type,
        operation,
        status: BatchStatus::PendingApproval,
        creator: actor.clone(),
        request_id: request_id.to_string(),
        counts: BatchCounts::new(children.len() as u32),
        reason: request.reason.clone(),
        approved_by: None,
        created_at: now,
        updated_at: now,
    };
    NewBatch { parent, children }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use fleet_core::{PoolConfig, PoolsConfig, TaskError, TaskPools};
    use fleet_model::BatchItem;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::LimitScope;
    use crate::limiter::{WindowLimiter, WindowLimiterConfig};
    use crate::runner::ChildExecutor;
    use crate::store::InMemoryTicketStore;

    struct Harness {
        orch: Orchestrator,
        store: Arc<InMemoryTicketStore>,
        limiter: Arc<WindowLimiter>,
    }

    fn harness(global_limit: u32, per_actor_items: u32) -> Harness {
        let store = Arc::new(InMemoryTicketStore::new());
        let limiter = Arc::new(WindowLimiter::new(WindowLimiterConfig {
            window: Duration::from_secs(600),
            global_limit,
            per_actor_items,
        }));
        let orch = Orchestrator::new(
            OrchestratorConfig::default(),
            store.clone(),
            limiter.clone(),
        );
        Harness {
            orch,
            store,
            limiter,
        }
    }

    fn roomy() -> Harness {
        harness(1000, 10_000)
    }

    fn vms(n: usize) -> Vec<BatchItem> {
        (1..=n).map(|i| BatchItem::new("vm", format!("vm-{i}"))).collect()
    }

    fn restart(request_id: &str, n: usize) -> BatchRequest {
        BatchRequest::new(request_id, "BATCH_POWER", "restart").with_items(vms(n))
    }

    fn alice() -> ActorId {
        ActorId::from("alice")
    }

    #[tokio::test]
    async fn power_restart_cap_and_duplicate() {
        let h = roomy();

        let handle = h.orch.execute(&restart("r-50", 50), &alice()).await.unwrap();
        assert_eq!(handle.status, BatchStatus::PendingApproval);
        assert_eq!(handle.retry_after_secs, 5);
        assert_eq!(
            handle.poll_url,
            format!("/api/v1/batch-tickets/{}", handle.batch_id)
        );

        let err = h
            .orch
            .execute(&restart("r-51", 51), &alice())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BatchError::TooLarge {
                limit: 50,
                requested: 51
            }
        );

        let again = h.orch.execute(&restart("r-50", 50), &alice()).await.unwrap();
        assert_eq!(again, handle);
        assert_eq!(h.store.batch_count(), 1);
        assert_eq!(h.limiter.actor_used(&alice()), 50);
        assert_eq!(h.limiter.global_used(), 1);
    }

    #[tokio::test]
    async fn invalid_requests_have_no_side_effects() {
        let h = roomy();
        let cases = [
            restart("  ", 1),
            BatchRequest::new("r1", "BATCH_TELEPORT", "restart").with_items(vms(1)),
            BatchRequest::new("r1", "BATCH_POWER", "delete").with_items(vms(1)),
            BatchRequest::new("r1", "BATCH_POWER", "stop"),
            BatchRequest::new("r1", "BATCH_POWER", "stop")
                .with_item(BatchItem::new("vm", "a"))
                .with_item(BatchItem::new("vm", " ")),
        ];
        for req in &cases {
            let err = h.orch.execute(req, &alice()).await.unwrap_err();
            assert_eq!(err.as_label(), "invalid_request", "{req:?}");
        }
        assert_eq!(h.store.batch_count(), 0);
        assert_eq!(h.limiter.global_used(), 0);
        assert_eq!(h.limiter.actor_used(&alice()), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicates_yield_one_parent() {
        let h = Arc::new(roomy());
        let start = Arc::new(tokio::sync::Barrier::new(8));
        let mut joins = Vec::new();
        for _ in 0..8 {
            let (h, start) = (Arc::clone(&h), Arc::clone(&start));
            joins.push(tokio::spawn(async move {
                start.wait().await;
                h.orch.execute(&restart("same", 3), &alice()).await
            }));
        }
        let mut ids = Vec::new();
        for j in joins {
            ids.push(j.await.unwrap().unwrap().batch_id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(h.store.batch_count(), 1);
        assert_eq!(h.store.child_count(), 3);
        // only the submission that wrote the batch is charged
        assert_eq!(h.limiter.global_used(), 1);
        assert_eq!(h.limiter.actor_used(&alice()), 3);
    }

    #[tokio::test]
    async fn malformed_row_at_write_time_leaves_nothing() {
        let h = roomy();
        let mut items = vms(5);
        items[2].resource_id = "x".repeat(300);
        let req = BatchRequest::new("r1", "BATCH_POWER", "stop").with_items(items);

        let err = h.orch.execute(&req, &alice()).await.unwrap_err();
        assert!(matches!(err, BatchError::InvalidRequest(ref m) if m.contains("child 3")));
        assert_eq!(h.store.batch_count(), 0);
        assert_eq!(h.store.child_count(), 0);
        assert_eq!(h.limiter.global_used(), 0);
        assert_eq!(h.limiter.actor_used(&alice()), 0);
    }

    #[tokio::test]
    async fn global_refusal_consumes_no_actor_quota() {
        let h = harness(1, 100);
        h.orch.execute(&restart("r1", 4), &alice()).await.unwrap();

        let err = h.orch.execute(&restart("r2", 7), &alice()).await.unwrap_err();
        assert!(matches!(
            err,
            BatchError::RateLimited {
                scope: LimitScope::Global,
                ..
            }
        ));
        assert!(err.retry_after().is_some());
        assert_eq!(h.limiter.actor_used(&alice()), 4);

        // a duplicate still resolves while the limiter is exhausted
        assert!(h.orch.execute(&restart("r1", 4), &alice()).await.is_ok());
    }

    #[tokio::test]
    async fn per_actor_quota_is_weighted_by_items() {
        let h = harness(100, 10);
        h.orch.execute(&restart("r1", 6), &alice()).await.unwrap();
        let err = h.orch.execute(&restart("r2", 5), &alice()).await.unwrap_err();
        assert!(matches!(
            err,
            BatchError::RateLimited {
                scope: LimitScope::Actor,
                ..
            }
        ));
        assert_eq!(h.limiter.actor_used(&alice()), 6);
        assert_eq!(h.limiter.global_used(), 1);
        h.orch
            .execute(&restart("r3", 5), &ActorId::from("bob"))
            .await
            .unwrap();
    }

    /// Drives three children into Succeeded / Failed / Pending through the store.
    async fn mixed_batch(h: &Harness) -> (BatchId, Vec<ChildTicket>) {
        let handle = h.orch.execute(&restart("mixed", 3), &alice()).await.unwrap();
        let id = handle.batch_id;
        h.orch.approve(&id, &ActorId::from("root")).await.unwrap();
        let kids = h.orch.children(&id).await.unwrap();

        h.store.start_child(&kids[0].id).await.unwrap();
        h.store.finish_child(&kids[0].id, Ok(())).await.unwrap();
        h.store.start_child(&kids[1].id).await.unwrap();
        h.store
            .finish_child(&kids[1].id, Err("boom".into()))
            .await
            .unwrap();
        (id, kids)
    }

    #[tokio::test]
    async fn requeue_touches_only_failed_children() {
        let h = roomy();
        let (id, _) = mixed_batch(&h).await;

        assert_eq!(h.orch.requeue_failed(&id, &alice()).await.unwrap(), 1);
        let p = h.orch.get(&id).await.unwrap();
        assert_eq!((p.counts.succeeded, p.counts.failed, p.counts.pending), (1, 0, 2));
        assert!(p.counts.is_consistent());

        assert_eq!(h.orch.requeue_failed(&id, &alice()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cancel_leaves_running_and_terminal_children() {
        let h = roomy();
        let (id, kids) = mixed_batch(&h).await;
        h.store.start_child(&kids[2].id).await.unwrap();

        assert_eq!(h.orch.cancel_pending(&id, &alice()).await.unwrap(), 0);

        h.orch.requeue_failed(&id, &alice()).await.unwrap();
        assert_eq!(h.orch.cancel_pending(&id, &alice()).await.unwrap(), 1);
        assert_eq!(h.orch.cancel_pending(&id, &alice()).await.unwrap(), 0);

        let statuses: Vec<ChildStatus> = h
            .orch
            .children(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                ChildStatus::Succeeded,
                ChildStatus::Cancelled,
                ChildStatus::Running
            ]
        );
        let p = h.orch.get(&id).await.unwrap();
        assert!(p.counts.is_consistent());
        assert_eq!(p.status, BatchStatus::Processing);

        // the last running child settles the batch
        h.store.finish_child(&kids[2].id, Ok(())).await.unwrap();
        assert_eq!(h.orch.get(&id).await.unwrap().status, BatchStatus::Completed);
    }

    #[tokio::test]
    async fn only_the_creator_may_requeue_or_cancel() {
        let h = roomy();
        let handle = h.orch.execute(&restart("r1", 2), &alice()).await.unwrap();
        let bob = ActorId::from("bob");

        assert!(matches!(
            h.orch.requeue_failed(&handle.batch_id, &bob).await,
            Err(BatchError::Forbidden(_))
        ));
        assert!(matches!(
            h.orch.cancel_pending(&handle.batch_id, &bob).await,
            Err(BatchError::Forbidden(_))
        ));
        assert!(matches!(
            h.orch.cancel_pending(&BatchId::generate(), &alice()).await,
            Err(BatchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn approve_twice_is_invalid() {
        let h = roomy();
        let handle = h.orch.execute(&restart("r1", 2), &alice()).await.unwrap();
        let root = ActorId::from("root");
        let approved = h.orch.approve(&handle.batch_id, &root).await.unwrap();
        assert_eq!(approved.status, BatchStatus::Processing);
        assert!(matches!(
            h.orch.approve(&handle.batch_id, &root).await,
            Err(BatchError::InvalidRequest(_))
        ));
    }

    /// Fails resource `vm-2` on its first attempt only.
    struct FlakyExecutor;

    #[async_trait]
    impl ChildExecutor for FlakyExecutor {
        async fn execute(
            &self,
            _ctx: CancellationToken,
            _batch: &BatchTicket,
            child: &ChildTicket,
        ) -> Result<(), TaskError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if child.resource_id == "vm-2" && child.attempts == 1 {
                return Err(TaskError::Fail {
                    reason: "hypervisor timeout".into(),
                });
            }
            Ok(())
        }
    }

    async fn wait_settled(orch: &Orchestrator, id: &BatchId) -> BatchTicket {
        for _ in 0..300 {
            let p = orch.get(id).await.unwrap();
            if p.status.is_final() {
                return p;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("batch {id} never settled");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn approved_batch_runs_and_requeue_recovers() {
        let cfg = PoolConfig::general()
            .with_capacity(4)
            .with_drain_timeout(Duration::from_secs(2));
        let pools = Arc::new(TaskPools::new(PoolsConfig {
            general: cfg.clone(),
            cluster: cfg,
        }));
        let h = roomy();
        let runner = BatchRunner::new(
            Arc::clone(&pools),
            h.store.clone(),
            Arc::new(FlakyExecutor),
        );
        let orch = Orchestrator::new(
            OrchestratorConfig::default(),
            h.store.clone(),
            h.limiter.clone(),
        )
        .with_runner(runner);

        let handle = orch.execute(&restart("run", 3), &alice()).await.unwrap();
        orch.approve(&handle.batch_id, &ActorId::from("root"))
            .await
            .unwrap();

        let p = wait_settled(&orch, &handle.batch_id).await;
        assert_eq!(p.status, BatchStatus::PartiallyFailed);
        assert_eq!((p.counts.succeeded, p.counts.failed), (2, 1));
        let failed = orch
            .children(&handle.batch_id)
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.status == ChildStatus::Failed)
            .unwrap();
        assert_eq!(
            failed.error.as_deref(),
            Some("execution failed: hypervisor timeout")
        );

        assert_eq!(orch.requeue_failed(&handle.batch_id, &alice()).await.unwrap(), 1);
        let p = wait_settled(&orch, &handle.batch_id).await;
        assert_eq!(p.status, BatchStatus::Completed);
        assert_eq!(p.counts.succeeded, 3);
        let retried = orch
            .children(&handle.batch_id)
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.resource_id == "vm-2")
            .unwrap();
        assert_eq!(retried.attempts, 2);

        pools.shutdown().await;
    }
    /// Panics on resource `vm-1` on its first attempt only.
    struct PanickyExecutor;

    #[async_trait]
    impl ChildExecutor for PanickyExecutor {
        async fn execute(
            &self,
            _ctx: CancellationToken,
            _batch: &BatchTicket,
            child: &ChildTicket,
        ) -> Result<(), TaskError> {
            if child.resource_id == "vm-1" && child.attempts == 1 {
                panic!("executor bug");
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn executor_panic_fails_the_child_and_stays_recoverable() {
        let cfg = PoolConfig::general()
            .with_capacity(2)
            .with_drain_timeout(Duration::from_secs(2));
        let pools = Arc::new(TaskPools::new(PoolsConfig {
            general: cfg.clone(),
            cluster: cfg,
        }));
        let h = roomy();
        let runner = BatchRunner::new(
            Arc::clone(&pools),
            h.store.clone(),
            Arc::new(PanickyExecutor),
        );
        let orch = Orchestrator::new(
            OrchestratorConfig::default(),
            h.store.clone(),
            h.limiter.clone(),
        )
        .with_runner(runner);

        let handle = orch.execute(&restart("boom", 1), &alice()).await.unwrap();
        orch.approve(&handle.batch_id, &ActorId::from("root"))
            .await
            .unwrap();

        let p = wait_settled(&orch, &handle.batch_id).await;
        assert_eq!(p.status, BatchStatus::PartiallyFailed);
        assert_eq!(p.counts.failed, 1);
        let child = &orch.children(&handle.batch_id).await.unwrap()[0];
        assert_eq!(child.status, ChildStatus::Failed);
        assert_eq!(child.error.as_deref(), Some("executor panicked: executor bug"));

        assert_eq!(orch.requeue_failed(&handle.batch_id, &alice()).await.unwrap(), 1);
        let p = wait_settled(&orch, &handle.batch_id).await;
        assert_eq!(p.status, BatchStatus::Completed);

        pools.shutdown().await;
    }
}
