//! Ticket storage.
//!
//! [`TicketStore`] is the persistence seam of the orchestrator. Every write
//! that touches more than one row (parent creation, requeue, cancel, child
//! completion) is a single atomic step of the store.
//!
//! [`InMemoryTicketStore`] keeps everything behind one lock, which makes each
//! method a transaction.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::SystemTime,
};

use async_trait::async_trait;
use fleet_model::{
    ActorId, BatchId, BatchStatus, BatchTicket, BatchType, ChildId, ChildStatus, ChildTicket,
};

use crate::error::StoreError;

/// Longest resource type or id a child row accepts.
const MAX_FIELD_LEN: usize = 255;

/// Parent plus its children, written together or not at all.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub parent: BatchTicket,
    /// Children in submission order.
    pub children: Vec<ChildTicket>,
}

/// Result of an idempotent create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(BatchTicket),
    /// A parent with the same `(creator, batch type, request id)` already existed.
    Existing(BatchTicket),
}

impl CreateOutcome {
    pub fn ticket(&self) -> &BatchTicket {
        match self {
            CreateOutcome::Created(t) | CreateOutcome::Existing(t) => t,
        }
    }

    pub fn into_ticket(self) -> BatchTicket {
        match self {
            CreateOutcome::Created(t) | CreateOutcome::Existing(t) => t,
        }
    }
}

#[async_trait]
pub trait TicketStore: Send + Sync + 'static {
    async fn find_by_idempotency_key(
        &self,
        creator: &ActorId,
        batch_type: BatchType,
        request_id: &str,
    ) -> Result<Option<BatchTicket>, StoreError>;

    /// Creates the parent and every child atomically.
    ///
    /// The idempotency key is checked again inside the write: when a matching
    /// parent exists, nothing is written and it is returned as `Existing`.
    async fn create_parent_and_children(&self, batch: NewBatch)
    -> Result<CreateOutcome, StoreError>;

    /// `Failed -> Pending` for every failed child. Returns the number moved.
    async fn requeue_failed_children(&self, batch: &BatchId) -> Result<u32, StoreError>;

    /// `Pending -> Cancelled` for every child not yet started. Returns the number moved.
    async fn cancel_pending_children(&self, batch: &BatchId) -> Result<u32, StoreError>;

    async fn get(&self, batch: &BatchId) -> Result<Option<BatchTicket>, StoreError>;

    /// Children of `batch` in sequence order.
    async fn children(&self, batch: &BatchId) -> Result<Vec<ChildTicket>, StoreError>;

    /// `PendingApproval -> Processing`.
    async fn approve(&self, batch: &BatchId, approver: &ActorId)
    -> Result<BatchTicket, StoreError>;

    /// `Pending -> Running` and one more attempt.
    ///
    /// Returns `None` when the child is no longer pending (cancelled, or
    /// already claimed by another run).
    async fn start_child(&self, child: &ChildId) -> Result<Option<ChildTicket>, StoreError>;

    /// `Running -> Succeeded | Failed`, then settles the parent when no child
    /// remains pending. Returns the updated parent.
    async fn finish_child(
        &self,
        child: &ChildId,
        outcome: Result<(), String>,
    ) -> Result<BatchTicket, StoreError>;
}

type IdempotencyKey = (ActorId, BatchType, String);

#[derive(Default)]
struct Tables {
    batches: HashMap<BatchId, BatchTicket>,
    /// Children per parent, in sequence order.
    children: HashMap<BatchId, Vec<ChildTicket>>,
    /// Child id -> (parent, position in the parent's child list).
    child_index: HashMap<ChildId, (BatchId, usize)>,
    idempotency: HashMap<IdempotencyKey, BatchId>,
}

impl Tables {
    /// Moves every child of `batch` in state `from` to `to`, updating the
    /// parent counters by increment.
    fn transition_all(
        &mut self,
        batch: &BatchId,
        from: ChildStatus,
        to: ChildStatus,
    ) -> Result<u32, StoreError> {
        let children = self
            .children
            .get_mut(batch)
            .ok_or_else(|| StoreError::NotFound(batch.to_string()))?;
        let parent = self
            .batches
            .get_mut(batch)
            .ok_or_else(|| StoreError::NotFound(batch.to_string()))?;

        let now = SystemTime::now();
        let mut moved = 0;
        for child in children.iter_mut().filter(|c| c.status == from) {
            child.status = to;
            child.updated_at = now;
            if to == ChildStatus::Pending {
                child.error = None;
            }
            moved += 1;
        }
        if moved > 0 {
            parent.counts.record_many(from, to, moved);
            parent.updated_at = now;
        }
        Ok(moved)
    }
}

/// Finalises a processing parent whose children have all settled.
fn settle(parent: &mut BatchTicket) {
    if parent.status == BatchStatus::Processing && parent.counts.is_settled() {
        parent.status = parent.counts.settled_status();
    }
}

fn check_row(child: &ChildTicket) -> Result<(), StoreError> {
    for (field, value) in [
        ("resource_type", &child.resource_type),
        ("resource_id", &child.resource_id),
    ] {
        if value.is_empty() || value.len() > MAX_FIELD_LEN {
            return Err(StoreError::Constraint(format!(
                "child {}: {field} must be 1..={MAX_FIELD_LEN} bytes, got {}",
                child.seq,
                value.len()
            )));
        }
    }
    Ok(())
}

/// In-process [`TicketStore`].
#[derive(Clone, Default)]
pub struct InMemoryTicketStore {
    inner: Arc<RwLock<Tables>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parent tickets stored.
    pub fn batch_count(&self) -> usize {
        self.read().batches.len()
    }

    /// Number of child tickets stored, across all parents.
    pub fn child_count(&self) -> usize {
        self.read().child_index.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn find_by_idempotency_key(
        &self,
        creator: &ActorId,
        batch_type: BatchType,
        request_id: &str,
    ) -> Result<Option<BatchTicket>, StoreError> {
        let t = self.read();
        let key = (creator.clone(), batch_type, request_id.to_string());
        Ok(t.idempotency
            .get(&key)
            .and_then(|id| t.batches.get(id))
            .cloned())
    }

    async fn create_parent_and_children(
        &self,
        batch: NewBatch,
    ) -> Result<CreateOutcome, StoreError> {
        let NewBatch { parent, children } = batch;
        let key = (
            parent.creator.clone(),
            parent.batch_type,
            parent.request_id.clone(),
        );

        let mut t = self.write();
        if let Some(existing) = t.idempotency.get(&key).and_then(|id| t.batches.get(id)) {
            return Ok(CreateOutcome::Existing(existing.clone()));
        }
        if children.len() != parent.counts.total as usize {
            return Err(StoreError::Constraint(format!(
                "parent expects {} children, got {}",
                parent.counts.total,
                children.len()
            )));
        }
        // every row is validated before anything is written
        for child in &children {
            if child.batch_id != parent.id {
                return Err(StoreError::Constraint(format!(
                    "child {} belongs to another batch",
                    child.seq
                )));
            }
            check_row(child)?;
        }
        if t.batches.contains_key(&parent.id) {
            return Err(StoreError::Constraint(format!(
                "batch {} already exists",
                parent.id
            )));
        }

        let id = parent.id;
        for (pos, child) in children.iter().enumerate() {
            t.child_index.insert(child.id, (id, pos));
        }
        t.children.insert(id, children);
        t.idempotency.insert(key, id);
        t.batches.insert(id, parent.clone());
        Ok(CreateOutcome::Created(parent))
    }

    async fn requeue_failed_children(&self, batch: &BatchId) -> Result<u32, StoreError> {
        let mut t = self.write();
        let moved = t.transition_all(batch, ChildStatus::Failed, ChildStatus::Pending)?;
        if moved > 0
            && let Some(parent) = t.batches.get_mut(batch)
            && parent.status.is_final()
        {
            parent.status = BatchStatus::Processing;
        }
        Ok(moved)
    }

    async fn cancel_pending_children(&self, batch: &BatchId) -> Result<u32, StoreError> {
        let mut t = self.write();
        let moved = t.transition_all(batch, ChildStatus::Pending, ChildStatus::Cancelled)?;
        if let Some(parent) = t.batches.get_mut(batch) {
            settle(parent);
        }
        Ok(moved)
    }

    async fn get(&self, batch: &BatchId) -> Result<Option<BatchTicket>, StoreError> {
        Ok(self.read().batches.get(batch).cloned())
    }

    async fn children(&self, batch: &BatchId) -> Result<Vec<ChildTicket>, StoreError> {
        self.read()
            .children
            .get(batch)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(batch.to_string()))
    }

    async fn approve(
        &self,
        batch: &BatchId,
        approver: &ActorId,
    ) -> Result<BatchTicket, StoreError> {
        let mut t = self.write();
        let parent = t
            .batches
            .get_mut(batch)
            .ok_or_else(|| StoreError::NotFound(batch.to_string()))?;
        if parent.status != BatchStatus::PendingApproval {
            return Err(StoreError::Constraint(format!(
                "batch {batch} is {}, not awaiting approval",
                parent.status.as_str()
            )));
        }
        parent.status = BatchStatus::Processing;
        parent.approved_by = Some(approver.clone());
        parent.updated_at = SystemTime::now();
        settle(parent);
        Ok(parent.clone())
    }

    async fn start_child(&self, child: &ChildId) -> Result<Option<ChildTicket>, StoreError> {
        let mut t = self.write();
        let (batch, pos) = t
            .child_index
            .get(child)
            .copied()
            .ok_or_else(|| StoreError::NotFound(child.to_string()))?;

        let Some(row) = t.children.get_mut(&batch).and_then(|c| c.get_mut(pos)) else {
            return Err(StoreError::NotFound(child.to_string()));
        };
        if row.status != ChildStatus::Pending {
            return Ok(None);
        }
        let now = SystemTime::now();
        row.status = ChildStatus::Running;
        row.attempts += 1;
        row.updated_at = now;
        let started = row.clone();

        if let Some(parent) = t.batches.get_mut(&batch) {
            parent
                .counts
                .record(ChildStatus::Pending, ChildStatus::Running);
            parent.updated_at = now;
        }
        Ok(Some(started))
    }

    async fn finish_child(
        &self,
        child: &ChildId,
        outcome: Result<(), String>,
    ) -> Result<BatchTicket, StoreError> {
        let mut t = self.write();
        let (batch, pos) = t
            .child_index
            .get(child)
            .copied()
            .ok_or_else(|| StoreError::NotFound(child.to_string()))?;

        let Some(row) = t.children.get_mut(&batch).and_then(|c| c.get_mut(pos)) else {
            return Err(StoreError::NotFound(child.to_string()));
        };
        if row.status != ChildStatus::Running {
            return Err(StoreError::Constraint(format!(
                "child {child} is {}, not running",
                row.status.as_str()
            )));
        }
        let now = SystemTime::now();
        let to = match outcome {
            Ok(()) => ChildStatus::Succeeded,
            Err(e) => {
                row.error = Some(e);
                ChildStatus::Failed
            }
        };
        row.status = to;
        row.updated_at = now;

        let parent = t
            .batches
            .get_mut(&batch)
            .ok_or_else(|| StoreError::NotFound(batch.to_string()))?;
        parent.counts.record(ChildStatus::Running, to);
        parent.updated_at = now;
        settle(parent);
        Ok(parent.clone())
    }
}

#[cfg(test)]
mod tests {
    use fleet_model::{BatchCounts, Operation};

    use super::*;

    fn batch(creator: &str, request_id: &str, ids: &[&str]) -> NewBatch {
        let id = BatchId::generate();
        let now = SystemTime::now();
        let parent = BatchTicket {
            id,
            batch_type: BatchType::Power,
            operation: Operation::Stop,
            status: BatchStatus::PendingApproval,
            creator: ActorId::from(creator),
            request_id: request_id.to_string(),
            counts: BatchCounts::new(ids.len() as u32),
            reason: None,
            approved_by: None,
            created_at: now,
            updated_at: now,
        };
        let children = ids
            .iter()
            .enumerate()
            .map(|(i, rid)| ChildTicket {
                id: ChildId::generate(),
                batch_id: id,
                seq: i as u32 + 1,
                resource_type: "vm".into(),
                resource_id: rid.to_string(),
                status: ChildStatus::Pending,
                attempts: 0,
                error: None,
                updated_at: now,
            })
            .collect();
        NewBatch { parent, children }
    }

    #[tokio::test]
    async fn create_is_idempotent_inside_the_write() {
        let s = InMemoryTicketStore::new();
        let first = s
            .create_parent_and_children(batch("alice", "r1", &["a", "b"]))
            .await
            .unwrap();
        assert!(matches!(first, CreateOutcome::Created(_)));

        let second = s
            .create_parent_and_children(batch("alice", "r1", &["a", "b", "c"]))
            .await
            .unwrap();
        assert!(matches!(second, CreateOutcome::Existing(_)));
        assert_eq!(first.ticket().id, second.ticket().id);
        assert_eq!(s.batch_count(), 1);
        assert_eq!(s.child_count(), 2);

        // same key under another actor is a distinct batch
        s.create_parent_and_children(batch("bob", "r1", &["a"]))
            .await
            .unwrap();
        assert_eq!(s.batch_count(), 2);
    }

    #[tokio::test]
    async fn bad_row_rolls_back_everything() {
        let s = InMemoryTicketStore::new();
        let long = "x".repeat(300);
        let err = s
            .create_parent_and_children(batch("alice", "r1", &["a", "b", long.as_str(), "d", "e"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(ref m) if m.contains("child 3")));
        assert_eq!(s.batch_count(), 0);
        assert_eq!(s.child_count(), 0);
        assert!(
            s.find_by_idempotency_key(&ActorId::from("alice"), BatchType::Power, "r1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn child_lifecycle_settles_parent() {
        let s = InMemoryTicketStore::new();
        let nb = batch("alice", "r1", &["a", "b"]);
        let id = nb.parent.id;
        let (c1, c2) = (nb.children[0].id, nb.children[1].id);
        s.create_parent_and_children(nb).await.unwrap();
        s.approve(&id, &ActorId::from("root")).await.unwrap();

        let started = s.start_child(&c1).await.unwrap().unwrap();
        assert_eq!(started.attempts, 1);
        assert!(s.start_child(&c1).await.unwrap().is_none());

        let p = s.finish_child(&c1, Ok(())).await.unwrap();
        assert_eq!(p.status, BatchStatus::Processing);

        s.start_child(&c2).await.unwrap();
        let p = s.finish_child(&c2, Err("boom".into())).await.unwrap();
        assert_eq!(p.status, BatchStatus::PartiallyFailed);
        assert_eq!((p.counts.succeeded, p.counts.failed), (1, 1));
        assert!(p.counts.is_consistent());

        // requeue re-opens the parent
        assert_eq!(s.requeue_failed_children(&id).await.unwrap(), 1);
        let p = s.get(&id).await.unwrap().unwrap();
        assert_eq!(p.status, BatchStatus::Processing);
        let kids = s.children(&id).await.unwrap();
        assert_eq!(kids[1].status, ChildStatus::Pending);
        assert_eq!(kids[1].error, None);
        assert_eq!(kids[1].attempts, 1);
    }

    #[tokio::test]
    async fn approve_only_from_pending_approval() {
        let s = InMemoryTicketStore::new();
        let nb = batch("alice", "r1", &["a"]);
        let id = nb.parent.id;
        s.create_parent_and_children(nb).await.unwrap();

        let p = s.approve(&id, &ActorId::from("root")).await.unwrap();
        assert_eq!(p.approved_by, Some(ActorId::from("root")));
        assert!(matches!(
            s.approve(&id, &ActorId::from("root")).await,
            Err(StoreError::Constraint(_))
        ));
        assert!(matches!(
            s.approve(&BatchId::generate(), &ActorId::from("root")).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn finishing_a_child_that_is_not_running_is_rejected() {
        let s = InMemoryTicketStore::new();
        let nb = batch("alice", "r1", &["a"]);
        let c1 = nb.children[0].id;
        s.create_parent_and_children(nb).await.unwrap();
        assert!(matches!(
            s.finish_child(&c1, Ok(())).await,
            Err(StoreError::Constraint(_))
        ));
    }
}
